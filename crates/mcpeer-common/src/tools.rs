use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Describes a function that can be called by an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Function {
    /// The name of the function.
    pub name: String,
    /// Human-readable description of what the function does.
    pub description: String,
    /// JSON Schema definition of the function's parameters.
    pub parameters: serde_json::Value,
}

/// Represents a tool available to the LLM, typically wrapping a function.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq)]
pub struct Tool {
    /// The type of tool (defaults to "function").
    #[serde(rename = "type")]
    #[builder(default = "function".to_string())]
    pub r#type: String,
    /// The function definition.
    pub function: Function,
}

impl Tool {
    /// Creates a function tool from its parts.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self::builder()
            .function(Function {
                name: name.into(),
                description: description.into(),
                parameters,
            })
            .build()
    }

    /// The function name, which is also the tool's identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Represents an invocation of a function with arguments.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// The name of the function being called.
    pub name: String,
    /// The arguments as a single JSON string.
    pub arguments: String,
}

impl FunctionCall {
    /// Returns the arguments as a JSON string slice.
    ///
    /// Returns `"{}"` if the arguments string is empty.
    #[must_use]
    pub fn arguments_json(&self) -> &str {
        if self.arguments.trim().is_empty() {
            "{}"
        } else {
            &self.arguments
        }
    }
}

/// A complete tool call from an LLM, including ID and function details.
///
/// Arguments in `function.arguments` are passed through as-is from API responses.
/// Callers validate and parse them when executing tools.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The function being invoked.
    pub function: FunctionCall,
    /// The type of call, typically "function".
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Creates a new tool call with a generated ID.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            call_type: default_call_type(),
        }
    }

    /// Replaces the generated ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Folds streamed fragments into complete tool calls.
    ///
    /// Fragments are matched by `index`. The first fragment for an index
    /// opens a call; later ones fill in a missing id/name and append argument
    /// text. Calls come back ordered by index, and a call that never received
    /// an id gets a generated one.
    #[must_use]
    pub fn merge_deltas(deltas: &[ToolCallDelta]) -> Vec<Self> {
        let mut slots: Vec<(u32, Option<String>, String, String)> = Vec::new();

        for delta in deltas {
            let slot = if let Some(pos) = slots.iter().position(|s| s.0 == delta.index) {
                &mut slots[pos]
            } else {
                slots.push((delta.index, None, String::new(), String::new()));
                let last = slots.len() - 1;
                &mut slots[last]
            };

            if slot.1.is_none() {
                slot.1.clone_from(&delta.id);
            }
            if let Some(name) = &delta.name {
                if slot.2.is_empty() {
                    slot.2.clone_from(name);
                }
            }
            if let Some(args) = &delta.arguments {
                slot.3.push_str(args);
            }
        }

        slots.sort_by_key(|s| s.0);
        slots
            .into_iter()
            .map(|(_, id, name, arguments)| {
                let call = Self::new(name, arguments);
                match id {
                    Some(id) if !id.is_empty() => call.with_id(id),
                    _ => call,
                }
            })
            .collect()
    }
}

/// A fragment of a tool call received while streaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Position of the call within the response.
    pub index: u32,
    /// Call ID, usually only present on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name, usually only present on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// A slice of the JSON argument text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_tool_builder_defaults_to_function() {
        let tool = Tool::function(
            "browser_navigate",
            "Navigate to a URL",
            serde_json::json!({"type": "object", "properties": {"url": {"type": "string"}}}),
        );

        assert_eq!(tool.r#type, "function");
        assert_eq!(tool.name(), "browser_navigate");

        let json = serde_json::to_value(&tool).expect("Failed to serialize");
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "browser_navigate");
    }

    #[test]
    fn test_empty_arguments_become_empty_object() {
        let call = ToolCall::new("list_mcp_servers", "");
        assert_eq!(call.function.arguments_json(), "{}");

        let call = ToolCall::new("search", r#"{"q":"x"}"#);
        assert_eq!(call.function.arguments_json(), r#"{"q":"x"}"#);
    }

    #[test]
    fn test_tool_call_serializes_openai_shape() {
        let call = ToolCall::new("search", "{}").with_id("call_abc");
        let json = serde_json::to_value(&call).unwrap();

        assert_eq!(json["id"], "call_abc");
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "search");

        let back: ToolCall = serde_json::from_value(serde_json::json!({
            "id": "call_1",
            "function": {"name": "search", "arguments": "{}"}
        }))
        .unwrap();
        assert_eq!(back.call_type, "function");
    }

    #[test]
    fn test_merge_deltas_by_index() {
        let deltas = vec![
            ToolCallDelta {
                index: 0,
                id: Some("call_a".into()),
                name: Some("search".into()),
                arguments: Some("{\"q\":".into()),
            },
            ToolCallDelta {
                index: 1,
                id: Some("call_b".into()),
                name: Some("fetch".into()),
                arguments: Some("{}".into()),
            },
            ToolCallDelta {
                index: 0,
                arguments: Some("\"rust\"}".into()),
                ..ToolCallDelta::default()
            },
        ];

        let calls = ToolCall::merge_deltas(&deltas);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "search");
        assert_eq!(calls[0].function.arguments, "{\"q\":\"rust\"}");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].function.name, "fetch");
    }

    #[test]
    fn test_merge_deltas_generates_missing_id() {
        let deltas = vec![ToolCallDelta {
            index: 3,
            name: Some("search".into()),
            ..ToolCallDelta::default()
        }];

        let calls = ToolCall::merge_deltas(&deltas);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].function.arguments_json(), "{}");
    }
}
