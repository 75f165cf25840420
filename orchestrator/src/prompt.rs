use crate::conversation::ConversationMessage;
use crate::registry::FunctionRegistry;

const INSTRUCTION_HEADER: &str = "You are the maintenance operations assistant. You answer questions about flight records, defects and their attachments using only the data returned by the available functions. When a function returns null, say that no matching record was found. When a function returns an error, explain the problem briefly instead of guessing.";

const LINK_CONVENTIONS: &str = "Link formatting: refer to application pages with Markdown links using relative paths taken from the application structure below, for example [Flight record FR-1](/flight-records/FR-1). Never invent paths that are not described there. Attachment download URLs are temporary; present them as links labelled with the file name.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub display_name: Option<String>,
}

impl UserIdentity {
    pub fn preferred_name(&self) -> &str {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

/// System instruction listing the registered functions; the application
/// structure text is embedded verbatim.
pub fn system_instruction(registry: &FunctionRegistry, app_structure: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(INSTRUCTION_HEADER);
    prompt.push_str("\n\nAvailable functions:\n");
    for spec in registry.list() {
        prompt.push_str(&format!("- {}: {}\n", spec.name, spec.description));
    }
    prompt.push('\n');
    prompt.push_str(LINK_CONVENTIONS);
    if let Some(structure) = app_structure.filter(|text| !text.trim().is_empty()) {
        prompt.push_str("\n\nApplication structure:\n");
        prompt.push_str(structure);
    }
    prompt
}

pub fn personalization(user: &UserIdentity) -> String {
    format!(
        "You are speaking with {} (username: {}). Address them by name when it reads naturally.",
        user.preferred_name(),
        user.username
    )
}

/// System instruction, personalization, then the caller's history.
pub fn seed_conversation(
    instruction: &str,
    user: &UserIdentity,
    history: Vec<ConversationMessage>,
) -> Vec<ConversationMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ConversationMessage::system(instruction));
    messages.push(ConversationMessage::system(personalization(user)));
    messages.extend(history);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionName;

    #[test]
    fn instruction_lists_every_function_and_embeds_structure() {
        let registry = FunctionRegistry::new();
        let prompt = system_instruction(&registry, Some("/flight-records/:id - record detail"));
        for name in FunctionName::ALL {
            assert!(prompt.contains(name.as_str()));
        }
        assert!(prompt.ends_with("/flight-records/:id - record detail"));
        assert!(!system_instruction(&registry, None).contains("Application structure"));
    }

    #[test]
    fn seed_puts_server_messages_first() {
        let user = UserIdentity {
            username: "jdoe".to_string(),
            display_name: Some("  ".to_string()),
        };
        let seeded = seed_conversation("rules", &user, vec![ConversationMessage::user("hi")]);
        assert_eq!(seeded.len(), 3);
        assert_eq!(seeded[0], ConversationMessage::system("rules"));
        assert!(matches!(&seeded[1], ConversationMessage::System { content } if content.contains("jdoe")));
        assert_eq!(seeded[2].role(), "user");
    }
}
