// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM conversations
//!
//! Messages deliberately carry no ids or timestamps: the exact serialized
//! form feeds the response cache fingerprint, so two logically identical
//! histories must serialize identically across process restarts.

use serde::{Deserialize, Serialize};

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// User message
    User,
    /// Assistant response (text or a function call)
    Assistant,
    /// Result of a function call
    Function,
}

/// A function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider-assigned call id, when the backend supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Raw JSON argument string exactly as streamed by the model
    pub arguments: String,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,
    /// Text content
    pub content: String,
    /// Function name (function role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function call requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// Id of the call this function result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            function_call: None,
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Create an assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Create an assistant message recording a function call
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            name: None,
            function_call: Some(call),
            tool_call_id: None,
        }
    }

    /// Create a function result message
    pub fn function_result(
        name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
            function_call: None,
            tool_call_id,
        }
    }

    /// Whether this is a function result message
    pub fn is_function_result(&self) -> bool {
        self.role == Role::Function
    }
}

/// Ordered, append-only conversation context
///
/// The system prompt is kept apart from the appended messages so a
/// session can refresh it (the watch REPL does) without touching
/// anything already recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
}

impl MessageHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history with a system prompt
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            messages: Vec::new(),
        }
    }

    /// Replace the system prompt
    pub fn set_system(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = Some(system_prompt.into());
    }

    /// The system prompt, if one is set
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All appended messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recently appended message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.name.is_none());
        assert!(msg.function_call.is_none());
    }

    #[test]
    fn test_message_function_result() {
        let msg = Message::function_result("ls", "a.txt", Some("call_1".to_string()));
        assert!(msg.is_function_result());
        assert_eq!(msg.name.as_deref(), Some("ls"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_message_function_call() {
        let msg = Message::function_call(FunctionCall {
            id: None,
            name: "ls".to_string(),
            arguments: "{}".to_string(),
        });
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_empty());
        assert_eq!(msg.function_call.unwrap().name, "ls");
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&Role::Function).unwrap(),
            "\"function\""
        );
    }

    #[test]
    fn test_history_push_and_last() {
        let mut history = MessageHistory::new();
        assert!(history.is_empty());

        history.push(Message::user("one"));
        history.push(Message::assistant("two"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().content, "two");
        assert_eq!(history.messages()[0].content, "one");
    }

    #[test]
    fn test_history_system_prompt() {
        let mut history = MessageHistory::with_system("be brief");
        assert_eq!(history.system_prompt(), Some("be brief"));

        history.push(Message::user("q"));
        history.set_system("be verbose");

        assert_eq!(history.system_prompt(), Some("be verbose"));
        assert_eq!(history.len(), 1);
    }
}
