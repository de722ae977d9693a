use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;

use super::types::{AgentDefinition, Handler, RegistryError, ToolDefinition};

/// Reserved agent-switch tool name pattern, matching the original's
/// `re.compile(r"assistant", re.IGNORECASE)`: a case-insensitive substring
/// test, not an anchored full-identifier match.
fn switch_pattern() -> &'static Regex {
    static PATTERN: once_cell::sync::OnceCell<Regex> = once_cell::sync::OnceCell::new();
    PATTERN.get_or_init(|| Regex::new("(?i)assistant").expect("static pattern is valid"))
}

/// Process-wide, read-mostly catalog of agent definitions. `register`/
/// `register_root` happen at startup or subject-initialization; after that,
/// lookups never write.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentDefinition>>,
    root_id: RwLock<Option<String>>,
    language: String,
}

impl AgentRegistry {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            root_id: RwLock::new(None),
            language: language.into(),
        }
    }

    fn expand(&self, template: &str) -> String {
        template.replace("{language}", &self.language)
    }

    /// Inserts under `agent.id`, expanding `{language}` in the system
    /// message. Idempotent: registering the same id again overwrites.
    pub fn register(&self, mut agent: AgentDefinition) {
        agent.system_message = self.expand(&agent.system_message);
        self.agents.write().unwrap().insert(agent.id.clone(), agent);
    }

    /// Like `register`, and additionally installs the agent under the
    /// alias `"root"`. Peer switch-tools are computed lazily in
    /// `tools_for`, so registration order never matters.
    pub fn register_root(&self, agent: AgentDefinition) {
        let id = agent.id.clone();
        self.register(agent);
        *self.root_id.write().unwrap() = Some(id);
    }

    fn resolve_alias<'a>(&self, id: &'a str) -> Option<String> {
        if id == "root" {
            self.root_id.read().unwrap().clone()
        } else {
            Some(id.to_string())
        }
    }

    pub fn get(&self, id: &str) -> Result<AgentDefinition, RegistryError> {
        let resolved = self
            .resolve_alias(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.agents
            .read()
            .unwrap()
            .get(&resolved)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// The agent's own tools, reshaped to realtime-function schema,
    /// concatenated with a generated switch-tool entry for every other
    /// registered agent.
    pub fn tools_for(&self, agent_id: &str) -> Result<Vec<ToolDefinition>, RegistryError> {
        let resolved = self
            .resolve_alias(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;
        let agents = self.agents.read().unwrap();
        let agent = agents
            .get(&resolved)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;

        let mut tools = agent.tools.clone();
        for (other_id, other) in agents.iter() {
            if *other_id == resolved {
                continue;
            }
            tools.push(ToolDefinition {
                name: other_id.clone(),
                description: other.description.clone(),
                parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
                handler: Handler::AgentSwitch(other_id.clone()),
            });
        }
        Ok(tools)
    }

    /// Locates a tool by name across every registered agent's own tools,
    /// falling back to treating `name` as an agent-switch target if it
    /// matches the reserved pattern and a matching agent is registered.
    pub fn locate_tool(&self, name: &str) -> Option<ToolDefinition> {
        let agents = self.agents.read().unwrap();
        for agent in agents.values() {
            if let Some(tool) = agent.tools.iter().find(|t| t.name == name) {
                return Some(tool.clone());
            }
        }
        if switch_pattern().is_match(name) {
            if let Some(target) = agents.get(name) {
                return Some(ToolDefinition {
                    name: name.to_string(),
                    description: target.description.clone(),
                    parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
                    handler: Handler::AgentSwitch(name.to_string()),
                });
            }
        }
        None
    }
}
