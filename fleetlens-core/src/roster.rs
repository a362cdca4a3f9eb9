//! The known fleet and the rules that attribute data to its members.
//!
//! Agent identity is fixed ahead of time rather than discovered from data.
//! Each attribution heuristic is an ordered rule table so it can be read and
//! tested on its own:
//!
//! | Table | Input | First match wins |
//! |-------|-------|------------------|
//! | [`Roster::agents`] | run label prefix | exact id match |
//! | [`Roster::session_dirs`] | `agents/<dir>/sessions` | one rule per dir |
//! | [`Roster::cron_rules`] | lowercased cron job name | substring match |

/// Static description of one fleet member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub role: String,
    pub emoji: String,
}

impl AgentProfile {
    pub fn new(id: &str, name: &str, role: &str, emoji: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            emoji: emoji.to_string(),
        }
    }
}

/// A session directory and the agent whose activity it records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDirRule {
    /// Directory name under `<root>/agents/`
    pub dir: String,
    /// Agent id the sessions belong to
    pub agent: String,
    /// How many of the newest files to summarize
    pub max_files: usize,
    /// Only count files whose first line is a session header
    pub require_header: bool,
    /// Session id reported for the agent
    pub session_key: String,
}

/// Cron ownership by job-name keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronOwnerRule {
    pub keywords: Vec<String>,
    pub owner: String,
}

impl CronOwnerRule {
    fn new(keywords: &[&str], owner: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            owner: owner.to_string(),
        }
    }

    fn matches(&self, name_lower: &str) -> bool {
        self.keywords.iter().any(|k| name_lower.contains(k.as_str()))
    }
}

/// The fleet: agents in display order plus attribution rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Display order; the first agent is the main one
    pub agents: Vec<AgentProfile>,
    pub session_dirs: Vec<SessionDirRule>,
    pub cron_rules: Vec<CronOwnerRule>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            agents: vec![
                AgentProfile::new("kira", "ApoMac", "CEO", "👑"),
                AgentProfile::new("hunter", "Hunter", "CRO", "💰"),
                AgentProfile::new("forge", "Forge", "CTO", "🔨"),
                AgentProfile::new("echo", "Echo", "CMO", "📢"),
                AgentProfile::new("atlas", "Atlas", "COO", "📊"),
                AgentProfile::new("sentinel", "Sentinel", "CCO", "🛡️"),
            ],
            session_dirs: vec![
                SessionDirRule {
                    dir: "main".to_string(),
                    agent: "kira".to_string(),
                    max_files: 15,
                    require_header: true,
                    session_key: "agent:main:main".to_string(),
                },
                SessionDirRule::single("hunter", "hunter"),
                SessionDirRule::single("cto-forge", "forge"),
                SessionDirRule::single("sentinel", "sentinel"),
            ],
            cron_rules: vec![
                CronOwnerRule::new(&["forge"], "forge"),
                CronOwnerRule::new(&["hunter", "revenue"], "hunter"),
                CronOwnerRule::new(&["echo", "content", "marketing"], "echo"),
                CronOwnerRule::new(&["atlas", "standup", "fleet"], "atlas"),
                CronOwnerRule::new(&["sentinel", "security", "audit"], "sentinel"),
                CronOwnerRule::new(&["backup", "git"], "forge"),
                CronOwnerRule::new(&["morning", "inspiration"], "kira"),
            ],
        }
    }
}

impl SessionDirRule {
    /// Rule for a secondary agent: newest file only, no header check
    pub fn single(dir: &str, agent: &str) -> Self {
        Self {
            dir: dir.to_string(),
            agent: agent.to_string(),
            max_files: 1,
            require_header: false,
            session_key: format!("agent:{}", dir),
        }
    }
}

impl Roster {
    /// The main agent: owner of unlabeled runs and unmatched cron jobs
    pub fn main_agent(&self) -> Option<&AgentProfile> {
        self.agents.first()
    }

    /// Id of the main agent, or an empty string for an empty roster
    pub fn default_owner(&self) -> &str {
        self.main_agent().map(|a| a.id.as_str()).unwrap_or("")
    }

    pub fn agent(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Attribute a run label to an agent.
    ///
    /// An empty label is the main agent. Otherwise the text before the first
    /// `-` is matched case-insensitively against agent ids; unknown prefixes
    /// yield `None` and callers fall back to [`Roster::default_owner`].
    pub fn agent_for_label(&self, label: &str) -> Option<&AgentProfile> {
        if label.is_empty() {
            return self.main_agent();
        }
        let prefix = label.split('-').next().unwrap_or("").to_lowercase();
        self.agent(&prefix)
    }

    /// Owner of a cron job: declared owner, then keyword rules, then default
    pub fn cron_owner(&self, declared: Option<&str>, job_name: &str) -> String {
        if let Some(owner) = declared.filter(|o| !o.is_empty()) {
            return owner.to_string();
        }

        let name_lower = job_name.to_lowercase();
        self.cron_rules
            .iter()
            .find(|rule| rule.matches(&name_lower))
            .map(|rule| rule.owner.clone())
            .unwrap_or_else(|| self.default_owner().to_string())
    }

    /// Session-directory rule by directory name
    pub fn session_dir(&self, dir: &str) -> Option<&SessionDirRule> {
        self.session_dirs.iter().find(|r| r.dir == dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_order() {
        let roster = Roster::default();
        let ids: Vec<_> = roster.agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["kira", "hunter", "forge", "echo", "atlas", "sentinel"]);
        assert_eq!(roster.default_owner(), "kira");
    }

    #[test]
    fn test_label_prefix_attribution() {
        let roster = Roster::default();
        assert_eq!(roster.agent_for_label("").unwrap().id, "kira");
        assert_eq!(roster.agent_for_label("forge-fix-ci").unwrap().id, "forge");
        assert_eq!(roster.agent_for_label("Hunter-leads").unwrap().id, "hunter");
        assert_eq!(roster.agent_for_label("atlas").unwrap().id, "atlas");
        assert!(roster.agent_for_label("random-task").is_none());
        assert!(roster.agent_for_label("-leading-dash").is_none());
    }

    #[test]
    fn test_cron_owner_keyword_match() {
        let roster = Roster::default();
        assert_eq!(roster.cron_owner(None, "hunter-revenue-report"), "hunter");
        assert_eq!(roster.cron_owner(None, "Weekly Security Audit"), "sentinel");
        assert_eq!(roster.cron_owner(None, "nightly git backup"), "forge");
        assert_eq!(roster.cron_owner(None, "Morning inspiration"), "kira");
        assert_eq!(roster.cron_owner(None, "something else"), "kira");
    }

    #[test]
    fn test_cron_owner_rules_are_ordered() {
        let roster = Roster::default();
        // "fleet" (atlas) appears before "git" (forge) in rule order
        assert_eq!(roster.cron_owner(None, "fleet git sync"), "atlas");
        // "forge" is the first rule and beats "content"
        assert_eq!(roster.cron_owner(None, "content for forge"), "forge");
    }

    #[test]
    fn test_declared_owner_first() {
        let roster = Roster::default();
        assert_eq!(roster.cron_owner(Some("echo"), "hunter-revenue-report"), "echo");
        assert_eq!(roster.cron_owner(Some(""), "hunter-revenue-report"), "hunter");
    }

    #[test]
    fn test_session_dir_rules() {
        let roster = Roster::default();
        let main = roster.session_dir("main").unwrap();
        assert_eq!(main.max_files, 15);
        assert!(main.require_header);
        assert_eq!(main.session_key, "agent:main:main");

        let forge = roster.session_dir("cto-forge").unwrap();
        assert_eq!(forge.agent, "forge");
        assert_eq!(forge.max_files, 1);
        assert_eq!(forge.session_key, "agent:cto-forge");
        assert!(roster.session_dir("fleet-csuite").is_none());
    }
}
