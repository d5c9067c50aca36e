//! Caller-owned graph input
//!
//! The engine consumes already-built per-file control-flow graphs; it never
//! parses source. Functions live in an arena `Vec` with a name index, and
//! call edges carry `(file, function)` targets so an edge may cross file
//! boundaries — targets are resolved against the per-file graph map at
//! traversal time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Map from file path to that file's control-flow graph, enabling
/// cross-file traversal. Without it, detection stays at depth 0.
pub type CfgMap = HashMap<String, ControlFlowGraph>;

/// One statement or call inside a function: a candidate protection site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Line in source (1-based)
    pub line: u32,
    /// Statement text the patterns are matched against
    pub text: String,
    /// Names of the variables/paths flowing through this statement.
    /// A pattern match protects the intersection of these with the
    /// vulnerability's candidate paths.
    #[serde(default)]
    pub touches: Vec<String>,
}

/// A call edge to another function, possibly in another file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    /// File containing the target function
    pub file: String,
    /// Target function name
    pub function: String,
    /// Line of the call site (1-based)
    pub line: u32,
}

/// A function node in the per-file graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionNode {
    /// Function name, unique within the file
    pub name: String,
    /// Start line in source
    pub start_line: u32,
    /// End line in source
    pub end_line: u32,
    /// Candidate protection sites inside the function
    #[serde(default)]
    pub statements: Vec<Statement>,
    /// Outgoing calls
    #[serde(default)]
    pub callees: Vec<CallEdge>,
    /// Incoming calls
    #[serde(default)]
    pub callers: Vec<CallEdge>,
}

/// Control-flow graph for one file
///
/// Owned by the caller; the engine only reads it. The caller must not
/// mutate it while analysis is running.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    /// File this graph describes
    pub file: String,
    functions: Vec<FunctionNode>,
    by_name: HashMap<String, usize>,
}

impl ControlFlowGraph {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            functions: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add a function node. A node with a duplicate name replaces the
    /// earlier one.
    pub fn add_function(&mut self, node: FunctionNode) {
        match self.by_name.get(&node.name) {
            Some(&idx) => self.functions[idx] = node,
            None => {
                self.by_name.insert(node.name.clone(), self.functions.len());
                self.functions.push(node);
            }
        }
    }

    /// Look up a function by name
    pub fn function(&self, name: &str) -> Option<&FunctionNode> {
        self.by_name.get(name).map(|&idx| &self.functions[idx])
    }

    /// All functions in insertion order
    pub fn functions(&self) -> impl Iterator<Item = &FunctionNode> {
        self.functions.iter()
    }

    /// Number of source lines this graph spans, used against the size budget
    pub fn line_count(&self) -> u64 {
        self.functions
            .iter()
            .map(|f| f.end_line as u64)
            .max()
            .unwrap_or(0)
    }
}
