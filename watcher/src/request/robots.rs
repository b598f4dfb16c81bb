//! Minimal robots.txt policy
//!
//! Only the `*` user-agent groups matter since that is what the gateway
//! identifies as. Longest-prefix rule wins; ties go to allow. A policy
//! built from a failed or non-200 fetch allows everything.

#[derive(Debug, Clone)]
struct RobotsRule {
    allow: bool,
    path: String,
}

#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    allow_all: bool,
    rules: Vec<RobotsRule>,
}

impl RobotsPolicy {
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            rules: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        let mut group_applies = false;
        let mut in_group_header = true;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();
            match field.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if !in_group_header {
                        group_applies = false;
                        in_group_header = true;
                    }
                    if value == "*" {
                        group_applies = true;
                    }
                }
                "allow" | "disallow" => {
                    in_group_header = false;
                    // An empty Disallow allows everything: no rule needed.
                    if group_applies && !value.is_empty() {
                        rules.push(RobotsRule {
                            allow: field == "allow",
                            path: value.to_string(),
                        });
                    }
                }
                _ => in_group_header = false,
            }
        }
        Self {
            allow_all: false,
            rules,
        }
    }

    pub fn can_fetch(&self, path: &str) -> bool {
        if self.allow_all || self.rules.is_empty() {
            return true;
        }
        let mut verdict = true;
        let mut best = 0usize;
        for rule in &self.rules {
            if path.starts_with(rule.path.as_str()) {
                let len = rule.path.len();
                if len > best || (len == best && rule.allow) {
                    best = len;
                    verdict = rule.allow;
                }
            }
        }
        verdict
    }
}
