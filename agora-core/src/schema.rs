//! Decision objects the model must emit each step, and the uniform envelope
//! every tool result is rendered into before re-entering the conversation.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::sandbox::ComputeMode;
use crate::structured::StructuredFormat;

/// One reasoning step: visible state, a short plan, and exactly one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    pub current_state: String,
    /// Between one and five entries; the LLM client re-prompts on violation.
    pub plan: Vec<String>,
    pub task_completed: bool,
    pub function: ToolCall,
}

pub const PLAN_MAX_LEN: usize = 5;

impl NextStep {
    pub fn plan_len_ok(&self) -> bool {
        !self.plan.is_empty() && self.plan.len() <= PLAN_MAX_LEN
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    ReportCompletion {
        completed_steps: Vec<String>,
        code: CompletionCode,
    },
    /// Sandboxed deterministic computation.
    Compute {
        code: String,
        description: String,
        #[serde(default)]
        mode: ComputeMode,
        #[serde(default)]
        intent: Option<String>,
    },
    ParseStructured {
        data: String,
        #[serde(default)]
        format: StructuredFormat,
        #[serde(default)]
        delimiter: Option<String>,
        #[serde(default)]
        column_names: Option<Vec<String>>,
        #[serde(default)]
        required_fields: Option<Vec<String>>,
    },
    ListProducts {
        #[serde(default)]
        offset: i64,
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        query: Option<String>,
    },
    ViewBasket {},
    AddProductToBasket {
        product_id: String,
        #[serde(default = "default_quantity")]
        quantity: i64,
    },
    RemoveItemFromBasket {
        product_id: String,
    },
    ApplyCoupon {
        code: String,
    },
    RemoveCoupon {},
    CheckoutBasket {},
}

fn default_quantity() -> i64 {
    1
}

impl ToolCall {
    /// The wire tag, used for logging and tool-call ids.
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ReportCompletion { .. } => "report_completion",
            ToolCall::Compute { .. } => "compute",
            ToolCall::ParseStructured { .. } => "parse_structured",
            ToolCall::ListProducts { .. } => "list_products",
            ToolCall::ViewBasket {} => "view_basket",
            ToolCall::AddProductToBasket { .. } => "add_product_to_basket",
            ToolCall::RemoveItemFromBasket { .. } => "remove_item_from_basket",
            ToolCall::ApplyCoupon { .. } => "apply_coupon",
            ToolCall::RemoveCoupon {} => "remove_coupon",
            ToolCall::CheckoutBasket {} => "checkout_basket",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionCode {
    Completed,
    Failed,
}

/// Uniform envelope so downstream logic and the conversation always see tool
/// output in one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEnvelope {
    pub tool: String,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolResultEnvelope {
    pub fn success(tool: &str, result: serde_json::Value) -> Self {
        Self {
            tool: tool.to_string(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool: &str, error: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // Envelope fields are plain data; serialization cannot fail in
            // practice, but the conversation must still get something.
            format!("{{\"tool\":\"{}\",\"ok\":false}}", self.tool)
        })
    }
}

/// JSON schema for [`NextStep`], handed to the model as the `json_schema`
/// response format and repeated as an inline hint.
pub fn next_step_schema() -> serde_json::Value {
    let tool_variant = |tool: &str, properties: serde_json::Value, required: Vec<&str>| {
        let mut props = properties;
        props["tool"] = json!({"const": tool});
        let mut all_required = vec!["tool".to_string()];
        all_required.extend(required.into_iter().map(String::from));
        json!({
            "type": "object",
            "properties": props,
            "required": all_required,
            "additionalProperties": false,
        })
    };

    json!({
        "type": "object",
        "properties": {
            "current_state": {"type": "string"},
            "plan": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 1,
                "maxItems": PLAN_MAX_LEN,
            },
            "task_completed": {"type": "boolean"},
            "function": {
                "oneOf": [
                    tool_variant(
                        "report_completion",
                        json!({
                            "completed_steps": {"type": "array", "items": {"type": "string"}},
                            "code": {"enum": ["completed", "failed"]},
                        }),
                        vec!["completed_steps", "code"],
                    ),
                    tool_variant(
                        "compute",
                        json!({
                            "code": {
                                "type": "string",
                                "description": "Single expression to evaluate deterministically",
                            },
                            "description": {"type": "string"},
                            "mode": {"enum": ["analytics", "validation"]},
                            "intent": {"type": ["string", "null"]},
                        }),
                        vec!["code", "description"],
                    ),
                    tool_variant(
                        "parse_structured",
                        json!({
                            "data": {"type": "string"},
                            "format": {"enum": ["json", "csv", "lines"]},
                            "delimiter": {"type": ["string", "null"]},
                            "column_names": {
                                "type": ["array", "null"],
                                "items": {"type": "string"},
                            },
                            "required_fields": {
                                "type": ["array", "null"],
                                "items": {"type": "string"},
                            },
                        }),
                        vec!["data"],
                    ),
                    tool_variant(
                        "list_products",
                        json!({
                            "offset": {"type": "integer"},
                            "limit": {"type": ["integer", "null"]},
                            "query": {"type": ["string", "null"]},
                        }),
                        vec![],
                    ),
                    tool_variant("view_basket", json!({}), vec![]),
                    tool_variant(
                        "add_product_to_basket",
                        json!({
                            "product_id": {"type": "string"},
                            "quantity": {"type": "integer"},
                        }),
                        vec!["product_id"],
                    ),
                    tool_variant(
                        "remove_item_from_basket",
                        json!({"product_id": {"type": "string"}}),
                        vec!["product_id"],
                    ),
                    tool_variant(
                        "apply_coupon",
                        json!({"code": {"type": "string"}}),
                        vec!["code"],
                    ),
                    tool_variant("remove_coupon", json!({}), vec![]),
                    tool_variant("checkout_basket", json!({}), vec![]),
                ],
            },
        },
        "required": ["current_state", "plan", "task_completed", "function"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_compute_round_trip() {
        let step = NextStep {
            current_state: "reversing the secret".to_string(),
            plan: vec!["reverse".to_string(), "submit".to_string()],
            task_completed: false,
            function: ToolCall::Compute {
                code: "'NcS9euQa'[::-1]".to_string(),
                description: "reverse the secret".to_string(),
                mode: ComputeMode::Analytics,
                intent: None,
            },
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"tool\":\"compute\""));
        let parsed: NextStep = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, step);
    }

    #[test]
    fn test_compute_defaults() {
        let parsed: ToolCall = serde_json::from_str(
            r#"{"tool": "compute", "code": "1 + 1", "description": "sum"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ToolCall::Compute {
                code: "1 + 1".to_string(),
                description: "sum".to_string(),
                mode: ComputeMode::Analytics,
                intent: None,
            }
        );
    }

    #[test]
    fn test_store_tool_tags() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "apply_coupon", "code": "SAVE20"}"#).unwrap();
        assert_eq!(
            call,
            ToolCall::ApplyCoupon {
                code: "SAVE20".to_string()
            }
        );
        assert_eq!(call.name(), "apply_coupon");

        let call: ToolCall = serde_json::from_str(r#"{"tool": "view_basket"}"#).unwrap();
        assert_eq!(call, ToolCall::ViewBasket {});
    }

    #[test]
    fn test_add_product_quantity_default() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "add_product_to_basket", "product_id": "p1"}"#)
                .unwrap();
        assert_eq!(
            call,
            ToolCall::AddProductToBasket {
                product_id: "p1".to_string(),
                quantity: 1,
            }
        );
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = ToolResultEnvelope::success("compute", serde_json::json!("aQue9ScN"));
        assert!(ok.ok);
        assert_eq!(ok.result, Some(serde_json::json!("aQue9ScN")));
        assert_eq!(ok.error, None);

        let err = ToolResultEnvelope::failure("compute", "NameError: name 'x' is not defined");
        assert!(!err.ok);
        assert!(err.result.is_none());
        let json = err.to_json();
        assert!(json.contains("NameError"));
    }

    #[test]
    fn test_schema_names_every_tool() {
        let schema = next_step_schema();
        let rendered = schema.to_string();
        for tool in [
            "report_completion",
            "compute",
            "parse_structured",
            "list_products",
            "view_basket",
            "add_product_to_basket",
            "remove_item_from_basket",
            "apply_coupon",
            "remove_coupon",
            "checkout_basket",
        ] {
            assert!(rendered.contains(tool), "schema is missing {}", tool);
        }
    }
}
