//! Prompt assembly for template filling.

/// Role the model is asked to play when none is configured.
pub const DEFAULT_ROLE: &str = "RTL design engineer";

const INSTRUCTIONS: &str = r#"Instructions:
- Carefully analyze the project requirements.
- Do not include any markdown formatting, especially backticks (`) or triple backticks (```). Output pure YAML only.
- Fill in *all* placeholders in the YAML template with appropriate values derived from the requirements.
- Maintain the YAML structure exactly as provided in the template. Do *not* add or remove any fields. Only fill in the existing placeholders.
- Use appropriate data types (e.g., strings, lists, dictionaries) as indicated by the template.
- Ensure placeholders are filled with detailed and meaningful information. If a placeholder cannot be determined from the given requirements, use "N/A" or an empty list/dictionary as appropriate. Do *not* leave placeholders blank.
- Be as detailed as possible in your descriptions."#;

/// Build the instruction prompt from the raw requirements and the serialized template.
///
/// Never fails. Trailing whitespace of each input is dropped so the closing
/// fence sits on the line after the content; everything else, including
/// leading whitespace and empty strings, is embedded unchanged.
pub fn build_prompt(role: &str, requirements: &str, template_yaml: &str) -> String {
    format!(
        "You are a {role}. I will provide project requirements and a YAML template \
for a project specification. Your task is to fill in the YAML template based on \
the project requirements.

Project Requirements:
```
{requirements}
```

YAML Template:
```yaml
{template}
```

{INSTRUCTIONS}

Filled-in YAML Specification:
",
        role = role,
        requirements = requirements.trim_end(),
        template = template_yaml.trim_end(),
    )
}
