use serde::{Deserialize, Serialize};

/// Function the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the function parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Immutable snapshot of registered tool declarations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolSet {
    declarations: Vec<ToolDeclaration>,
}

impl ToolSet {
    pub const fn new(declarations: Vec<ToolDeclaration>) -> Self {
        Self { declarations }
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }
}

/// Structured function call returned by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON object
    pub args: serde_json::Value,
}
