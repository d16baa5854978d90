//! System prompt construction from discovered tools.

use crate::mcp_client::ToolDescriptor;

/// Placeholder replaced by the rendered tool list.
pub const TOOLS_PLACEHOLDER: &str = "{tools_description}";

/// Default template. `{tools_description}` expands to the tool blocks.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are a helpful assistant with access to these tools:

{tools_description}

Choose the appropriate tool based on the user's question. Use a tool **only when the user explicitly asks for something it provides**.
If no tool is needed, reply directly in plain text.

When you need to use a tool, respond **only** with a JSON object in exactly this format:

{
  "tool": "tool-name",
  "arguments": {
    "argument-name": "value"
  }
}

IMPORTANT: do not add explanations, comments or any text outside the JSON.
**The reply must contain only the JSON.** Nothing before or after it.
When a message contains a raw tool result, turn it into a clear, natural answer for the user.
"#;

/// Render one tool as a text block for the model.
pub fn format_tool_for_llm(tool: &ToolDescriptor) -> String {
    let args: Vec<String> = tool
        .parameters()
        .into_iter()
        .map(|p| {
            if p.required {
                format!("- {}: {} (required)", p.name, p.description)
            } else {
                format!("- {}: {}", p.name, p.description)
            }
        })
        .collect();

    format!(
        "\nTool: {}\nDescription: {}\nArguments:\n{}",
        tool.name,
        tool.description.as_deref().unwrap_or("No description"),
        args.join("\n")
    )
}

/// Interpolate the tool list into `template`.
pub fn build_system_prompt(template: &str, tools: &[ToolDescriptor]) -> String {
    let blocks: Vec<String> = tools.iter().map(format_tool_for_llm).collect();
    let description = format!("\n\nAvailable tools:\n{}", blocks.join("\n"));
    template.replace(TOOLS_PLACEHOLDER, &description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_tool() -> ToolDescriptor {
        serde_json::from_value(json!({
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "a": {"type": "integer", "description": "First addend"},
                    "b": {"type": "integer"}
                },
                "required": ["a", "b"]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_format_tool_for_llm() {
        let block = format_tool_for_llm(&add_tool());
        assert_eq!(
            block,
            "\nTool: add\nDescription: Add two numbers\nArguments:\n\
             - a: First addend (required)\n- b: No description (required)"
        );
    }

    #[test]
    fn test_format_tool_without_description_or_params() {
        let tool: ToolDescriptor =
            serde_json::from_value(json!({"name": "ping", "inputSchema": {"type": "object"}}))
                .unwrap();
        assert_eq!(
            format_tool_for_llm(&tool),
            "\nTool: ping\nDescription: No description\nArguments:\n"
        );
    }

    #[test]
    fn test_default_prompt_lists_tools_and_format() {
        let prompt = build_system_prompt(DEFAULT_SYSTEM_PROMPT, &[add_tool()]);
        assert!(prompt.contains("Available tools:\n\nTool: add"));
        assert!(prompt.contains("\"tool\": \"tool-name\""));
        assert!(!prompt.contains(TOOLS_PLACEHOLDER));
    }

    #[test]
    fn test_custom_template() {
        let prompt = build_system_prompt("Tools:{tools_description}", &[]);
        assert_eq!(prompt, "Tools:\n\nAvailable tools:\n");
    }
}
