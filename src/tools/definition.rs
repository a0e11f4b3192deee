// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool definition helpers

use serde_json::{Map, Value};

use crate::llm::provider::{ToolDefinition, ToolInputSchema};

/// Helper to create a tool input schema
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string property
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "string", "description": description }),
            required,
        )
    }

    /// Add an integer property
    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "integer", "description": description }),
            required,
        )
    }

    /// Add a boolean property
    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "boolean", "description": description }),
            required,
        )
    }

    /// Build the schema
    pub fn build(self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Value::Object(self.properties),
            required: self.required,
        }
    }
}

impl ToolDefinition {
    /// Create a definition from its parts
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ToolInputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// The `{"type": "function", "function": {...}}` shape chat APIs expect
    pub fn to_function_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": self.input_schema.schema_type,
                    "properties": self.input_schema.properties,
                    "required": self.input_schema.required,
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder_empty() {
        let schema = SchemaBuilder::new().build();
        assert_eq!(schema.schema_type, "object");
        assert_eq!(schema.properties, serde_json::json!({}));
        assert!(schema.required.is_empty());
    }

    #[test]
    fn test_schema_builder_required_and_optional() {
        let schema = SchemaBuilder::new()
            .string("command", "Command to run", true)
            .integer("timeout", "Seconds", false)
            .boolean("verbose", "Chatty output", false)
            .build();

        assert_eq!(schema.required, vec!["command".to_string()]);
        assert_eq!(schema.properties["command"]["type"], "string");
        assert_eq!(schema.properties["timeout"]["type"], "integer");
        assert_eq!(schema.properties["verbose"]["type"], "boolean");
    }

    #[test]
    fn test_function_schema_shape() {
        let def = ToolDefinition::new(
            "list_files",
            "List a directory",
            SchemaBuilder::new().string("path", "Directory", true).build(),
        );
        let schema = def.to_function_schema();

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "list_files");
        assert_eq!(schema["function"]["parameters"]["required"][0], "path");
    }
}
