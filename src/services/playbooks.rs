//! Remediation playbooks for common failure patterns.
//!
//! Structured, auditable remediation sequences instead of ad-hoc agent
//! actions. Each playbook carries match rules (to select it) and ordered
//! steps (tool + argument templates) rendered as instructions for the
//! agent.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Equals,
    Contains,
    Regex,
}

/// Predicate evaluated against alert/issue fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRule {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl MatchRule {
    pub fn new(field: &str, operator: Operator, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.to_string(),
        }
    }

    pub fn matches(&self, data: &HashMap<String, String>) -> bool {
        let actual = data.get(&self.field).map_or("", String::as_str);
        match self.operator {
            Operator::Equals => actual == self.value,
            Operator::Contains => actual.contains(&self.value),
            Operator::Regex => Regex::new(&self.value)
                .map(|re| re.is_match(actual))
                .unwrap_or(false),
        }
    }
}

/// A single step in a playbook execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub name: String,
    pub tool: String,
    #[serde(default)]
    pub args_template: HashMap<String, String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub requires_approval: bool,
}

impl PlaybookStep {
    pub fn new(name: &str, tool: &str, args: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            tool: tool.to_string(),
            args_template: args
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            condition: None,
            requires_approval: false,
        }
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn approval_gated(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Render `{{var}}` placeholders from the context map.
    pub fn render_args(&self, context: &HashMap<String, String>) -> HashMap<String, String> {
        self.args_template
            .iter()
            .map(|(key, template)| {
                let mut value = template.clone();
                for (ctx_key, ctx_val) in context {
                    value = value.replace(&format!("{{{{{ctx_key}}}}}"), ctx_val);
                }
                (key.clone(), value)
            })
            .collect()
    }
}

/// A structured remediation sequence for a known failure pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub description: String,
    pub match_rules: Vec<MatchRule>,
    pub steps: Vec<PlaybookStep>,
    pub severity: String,
    pub max_auto_executions: u32,
}

impl Playbook {
    /// True if ALL match rules are satisfied. A playbook with no rules
    /// never matches.
    pub fn matches(&self, data: &HashMap<String, String>) -> bool {
        !self.match_rules.is_empty() && self.match_rules.iter().all(|rule| rule.matches(data))
    }

    /// Render the playbook as structured instructions for the agent.
    pub fn render_prompt(&self, context: &HashMap<String, String>) -> String {
        let mut lines = vec![
            format!("## Playbook: {}", self.name),
            format!("**Severity:** {}", self.severity),
            format!("**Description:** {}", self.description),
            String::new(),
            "### Steps:".to_string(),
        ];
        for (i, step) in self.steps.iter().enumerate() {
            let args = step.render_args(context);
            let mut pairs: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            let approval = if step.requires_approval {
                " [REQUIRES APPROVAL]"
            } else {
                ""
            };
            let condition = step
                .condition
                .as_ref()
                .map(|c| format!(" (if {c})"))
                .unwrap_or_default();
            lines.push(format!(
                "{}. **{}**: `{}({})`{approval}{condition}",
                i + 1,
                step.name,
                step.tool,
                pairs.join(", "),
            ));
        }
        lines.join("\n")
    }
}

/// The builtin playbook library.
pub fn builtin_playbooks() -> Vec<Playbook> {
    vec![
        Playbook {
            id: "crashloop-restart".to_string(),
            name: "CrashLoop pod restart".to_string(),
            description: "Inspect logs of a crash-looping pod, then restart it if the failure \
                          is transient"
                .to_string(),
            match_rules: vec![MatchRule::new("issue_type", Operator::Contains, "crashloop")],
            steps: vec![
                PlaybookStep::new(
                    "inspect previous logs",
                    "get_previous_pod_logs",
                    &[("namespace", "{{namespace}}"), ("name", "{{pod}}")],
                ),
                PlaybookStep::new(
                    "restart the pod",
                    "restart_pod",
                    &[
                        ("namespace", "{{namespace}}"),
                        ("name", "{{pod}}"),
                        ("reason", "crashloop playbook"),
                    ],
                )
                .with_condition("logs show a transient failure"),
            ],
            severity: "critical".to_string(),
            max_auto_executions: 3,
        },
        Playbook {
            id: "oom-rollout".to_string(),
            name: "OOMKilled rollout restart".to_string(),
            description: "Check memory usage against limits, then rollout-restart the owning \
                          deployment"
                .to_string(),
            match_rules: vec![MatchRule::new(
                "issue_type",
                Operator::Regex,
                "(?i)oom|out of memory",
            )],
            steps: vec![
                PlaybookStep::new(
                    "check memory vs limit",
                    "get_pod_memory",
                    &[("namespace", "{{namespace}}"), ("pod", "{{pod}}")],
                ),
                PlaybookStep::new(
                    "rollout restart",
                    "rollout_restart_deployment",
                    &[
                        ("namespace", "{{namespace}}"),
                        ("name", "{{deployment}}"),
                        ("reason", "oom playbook"),
                    ],
                ),
            ],
            severity: "warning".to_string(),
            max_auto_executions: 3,
        },
        Playbook {
            id: "stuck-rollout-rollback".to_string(),
            name: "Stuck rollout rollback".to_string(),
            description: "Roll a deployment back to its previous revision when a rollout stops \
                          progressing"
                .to_string(),
            match_rules: vec![MatchRule::new("issue_type", Operator::Contains, "rollout")],
            steps: vec![
                PlaybookStep::new(
                    "inspect rollout state",
                    "describe_deployment",
                    &[("namespace", "{{namespace}}"), ("name", "{{deployment}}")],
                ),
                PlaybookStep::new(
                    "rollback",
                    "rollback_deployment",
                    &[
                        ("namespace", "{{namespace}}"),
                        ("name", "{{deployment}}"),
                        ("reason", "stuck rollout playbook"),
                    ],
                ),
            ],
            severity: "warning".to_string(),
            max_auto_executions: 2,
        },
        Playbook {
            id: "failed-job-cleanup".to_string(),
            name: "Failed job cleanup".to_string(),
            description: "Capture a failed job's logs and remove it".to_string(),
            match_rules: vec![MatchRule::new("issue_type", Operator::Contains, "failed job")],
            steps: vec![
                PlaybookStep::new(
                    "capture logs",
                    "get_namespace_errors",
                    &[("namespace", "{{namespace}}")],
                ),
                PlaybookStep::new(
                    "delete the job",
                    "delete_failed_job",
                    &[
                        ("namespace", "{{namespace}}"),
                        ("name", "{{job}}"),
                        ("reason", "failed job playbook"),
                    ],
                ),
            ],
            severity: "info".to_string(),
            max_auto_executions: 5,
        },
        Playbook {
            id: "node-pressure-cordon".to_string(),
            name: "Node pressure cordon".to_string(),
            description: "Cordon a node under memory or disk pressure so workloads reschedule \
                          elsewhere"
                .to_string(),
            match_rules: vec![MatchRule::new(
                "issue_type",
                Operator::Regex,
                "(?i)(memory|disk|pid) ?pressure",
            )],
            steps: vec![
                PlaybookStep::new("inspect the node", "describe_node", &[("name", "{{node}}")]),
                PlaybookStep::new(
                    "cordon",
                    "cordon_node",
                    &[("name", "{{node}}"), ("reason", "node pressure playbook")],
                )
                .approval_gated(),
            ],
            severity: "warning".to_string(),
            max_auto_executions: 1,
        },
    ]
}

/// Find the first builtin playbook whose rules all match.
pub fn find_matching(data: &HashMap<String, String>) -> Option<Playbook> {
    builtin_playbooks().into_iter().find(|p| p.matches(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_match_operators() {
        let d = data(&[("issue_type", "pod crashloop detected")]);
        assert!(MatchRule::new("issue_type", Operator::Contains, "crashloop").matches(&d));
        assert!(!MatchRule::new("issue_type", Operator::Equals, "crashloop").matches(&d));
        assert!(MatchRule::new("issue_type", Operator::Regex, "crash.?loop").matches(&d));
        assert!(!MatchRule::new("missing", Operator::Contains, "x").matches(&d));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let d = data(&[("issue_type", "anything")]);
        assert!(!MatchRule::new("issue_type", Operator::Regex, "(unclosed").matches(&d));
    }

    #[test]
    fn test_empty_rules_never_match() {
        let playbook = Playbook {
            id: "x".into(),
            name: "x".into(),
            description: String::new(),
            match_rules: vec![],
            steps: vec![],
            severity: "info".into(),
            max_auto_executions: 1,
        };
        assert!(!playbook.matches(&data(&[("issue_type", "anything")])));
    }

    #[test]
    fn test_render_args_substitutes_context() {
        let step = PlaybookStep::new(
            "restart",
            "restart_pod",
            &[("namespace", "{{namespace}}"), ("name", "{{pod}}")],
        );
        let rendered = step.render_args(&data(&[("namespace", "default"), ("pod", "web-1")]));
        assert_eq!(rendered["namespace"], "default");
        assert_eq!(rendered["name"], "web-1");
    }

    #[test]
    fn test_find_matching_selects_crashloop() {
        let playbook = find_matching(&data(&[("issue_type", "crashloop")])).unwrap();
        assert_eq!(playbook.id, "crashloop-restart");
    }

    #[test]
    fn test_find_matching_oom_regex() {
        let playbook = find_matching(&data(&[("issue_type", "OOMKilled container")])).unwrap();
        assert_eq!(playbook.id, "oom-rollout");
    }

    #[test]
    fn test_render_prompt_contains_steps_and_markers() {
        let playbook = find_matching(&data(&[("issue_type", "memory pressure")])).unwrap();
        let prompt = playbook.render_prompt(&data(&[("node", "node-1")]));
        assert!(prompt.contains("## Playbook: Node pressure cordon"));
        assert!(prompt.contains("cordon_node"));
        assert!(prompt.contains("name=node-1"));
        assert!(prompt.contains("[REQUIRES APPROVAL]"));
    }
}
