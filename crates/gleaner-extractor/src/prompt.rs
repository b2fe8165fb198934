//! Prompt builders
//!
//! All prompts demand a bare JSON object so the worker-side repair only has
//! to deal with fences and truncation, not free prose.

use gleaner_domain::{EntityTypeDecl, FieldGroup, FieldType, PromptSpec};
use serde_json::Value;

use crate::facts::ExtractionProfile;

/// Prompts for extracting one field group from one chunk
pub fn field_group_prompts(group: &FieldGroup, source_context: &str, content: &str) -> PromptSpec {
    let mut system = format!(
        "You extract structured data from web content. Extract {} information.\n{}\n",
        group.name, group.description
    );
    if !group.prompt_hint.is_empty() {
        system.push('\n');
        system.push_str(&group.prompt_hint);
        system.push('\n');
    }

    system.push_str("\nFields to extract:\n");
    for field in &group.fields {
        let mut line = format!("- {} ({}): {}", field.name, type_label(field.field_type), field.description);
        if let Some(values) = &field.enum_values {
            line.push_str(&format!(" One of: {}", values.join(", ")));
        }
        system.push_str(&line);
        system.push('\n');
    }

    if group.is_entity_list {
        system.push_str(&format!(
            "\nReturn ONLY a JSON object: {{\"{}\": [one object per item with the fields above], \"confidence\": 0.0-1.0}}.\n\
             Return an empty list when the content names none.",
            group.name
        ));
    } else {
        system.push_str(
            "\nReturn ONLY a JSON object with the field names above as keys plus a \
             \"confidence\" key in [0.0, 1.0]. Omit fields the content does not support. \
             No markdown, no commentary.",
        );
    }

    let user = if source_context.is_empty() {
        format!("Content:\n{content}")
    } else {
        format!("Source: {source_context}\n\nContent:\n{content}")
    };

    PromptSpec {
        system_prompt: Some(system),
        user_prompt: Some(user),
        model: None,
    }
}

/// Prompts for generic fact extraction over one chunk
pub fn fact_prompts(profile: &ExtractionProfile, content: &str) -> PromptSpec {
    let mut system = format!(
        "You extract discrete factual statements from web content.\n\
         Focus: {}\nDepth: {}\nCategories: {}\n",
        profile.prompt_focus,
        profile.depth,
        profile.categories.join(", ")
    );
    if let Some(extra) = &profile.custom_instructions {
        system.push('\n');
        system.push_str(extra);
        system.push('\n');
    }
    system.push_str(
        "\nReturn ONLY a JSON object: {\"facts\": [{\"fact\": \"one self-contained statement\", \
         \"category\": \"one of the categories\", \"confidence\": 0.0-1.0, \
         \"header_context\": \"optional enclosing section\"}]}. \
         Skip navigation text, boilerplate, and marketing filler.",
    );

    PromptSpec {
        system_prompt: Some(system),
        user_prompt: Some(format!("Content:\n{content}")),
        model: None,
    }
}

/// Prompts for mining entities out of an extraction payload
pub fn entity_prompts(entity_types: &[EntityTypeDecl], extraction_data: &Value) -> PromptSpec {
    let mut system = String::from(
        "You extract normalisable entities from structured extraction data.\n\nEntity types:\n",
    );
    for decl in entity_types {
        system.push_str(&format!("- {}: {}\n", decl.name, decl.description));
    }
    system.push_str(
        "\nReturn ONLY a JSON object: {\"entities\": [{\"type\": \"one of the types above\", \
         \"value\": \"the exact value as written\", \"attributes\": {}}]}. \
         Return an empty list when nothing matches.",
    );

    PromptSpec {
        system_prompt: Some(system),
        user_prompt: Some(extraction_data.to_string()),
        model: None,
    }
}

fn type_label(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Boolean => "true/false",
        FieldType::Integer => "integer",
        FieldType::Float => "number",
        FieldType::Text => "text",
        FieldType::Enum => "enum",
        FieldType::List => "list",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::FieldDefinition;
    use serde_json::json;

    fn group() -> FieldGroup {
        FieldGroup {
            name: "company_info".to_string(),
            description: "Company identification".to_string(),
            prompt_hint: "Look for the official name".to_string(),
            is_entity_list: false,
            entity_key: None,
            fields: vec![FieldDefinition {
                name: "employee_count_range".to_string(),
                field_type: FieldType::Enum,
                description: "Employee range".to_string(),
                required: false,
                default: None,
                enum_values: Some(vec!["1-10".to_string(), "11-50".to_string()]),
            }],
        }
    }

    #[test]
    fn test_field_group_prompt_lists_fields_and_enums() {
        let prompts = field_group_prompts(&group(), "Acme", "# About\nAcme employs 40 people.");
        let system = prompts.system_prompt.unwrap();
        assert!(system.contains("employee_count_range"));
        assert!(system.contains("1-10, 11-50"));
        assert!(system.contains("Look for the official name"));
        let user = prompts.user_prompt.unwrap();
        assert!(user.starts_with("Source: Acme"));
    }

    #[test]
    fn test_entity_list_prompt_names_the_list_key() {
        let mut g = group();
        g.name = "products".to_string();
        g.is_entity_list = true;
        let prompts = field_group_prompts(&g, "", "content");
        assert!(prompts.system_prompt.unwrap().contains("\"products\""));
        assert!(prompts.user_prompt.unwrap().starts_with("Content:"));
    }

    #[test]
    fn test_entity_prompts_embed_payload() {
        let prompts = entity_prompts(
            &[EntityTypeDecl { name: "pricing".to_string(), description: "A price".to_string() }],
            &json!({"plan": "Pro", "price": "$19.99/month"}),
        );
        assert!(prompts.system_prompt.unwrap().contains("pricing"));
        assert!(prompts.user_prompt.unwrap().contains("$19.99/month"));
    }
}
