//! Metadata the remote feed is known never to report.

/// One reason an expected key should not be waited for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuirkRule {
    /// Every member of this type.
    Type(String),
    /// Exactly this metadata key.
    Key(String),
    /// Keys starting with this prefix.
    KeyPrefix(String),
    /// Members of `type_name` whose name lacks `suffix` (standard, not custom).
    RequireSuffix { type_name: String, suffix: String },
}

impl QuirkRule {
    pub fn excludes(&self, type_name: &str, name: &str, key: &str) -> bool {
        match self {
            QuirkRule::Type(t) => t == type_name,
            QuirkRule::Key(k) => k == key,
            QuirkRule::KeyPrefix(p) => key.starts_with(p.as_str()),
            QuirkRule::RequireSuffix {
                type_name: t,
                suffix,
            } => t == type_name && !name.ends_with(suffix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingQuirks {
    rules: Vec<QuirkRule>,
}

const NEVER_TRACKED_TYPES: &[&str] = &[
    "CustomObject",
    "EmailFolder",
    "EmailTemplateFolder",
    "StandardValueSet",
    "Portal",
    "StandardValueSetTranslation",
    "SharingRules",
    "SharingCriteriaRule",
    "GlobalValueSetTranslation",
    "AssignmentRules",
    "InstalledPackage",
    "DataCategoryGroup",
    "ManagedTopic",
    "ManagedTopics",
    "ApexEmailNotifications",
];

const NEVER_TRACKED_KEYS: &[&str] = &["Profile###Standard", "Profile###Guest License User"];

impl Default for PollingQuirks {
    fn default() -> Self {
        let mut rules: Vec<QuirkRule> = NEVER_TRACKED_TYPES
            .iter()
            .map(|t| QuirkRule::Type(t.to_string()))
            .collect();
        rules.extend(NEVER_TRACKED_KEYS.iter().map(|k| QuirkRule::Key(k.to_string())));
        // Standard fields never show up; only custom ones do.
        rules.push(QuirkRule::RequireSuffix {
            type_name: "CustomField".into(),
            suffix: "__c".into(),
        });
        Self { rules }
    }
}

impl PollingQuirks {
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: QuirkRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[QuirkRule] {
        &self.rules
    }

    /// Whether the feed will never report this member.
    pub fn excludes(&self, type_name: &str, name: &str, key: &str) -> bool {
        self.rules.iter().any(|r| r.excludes(type_name, name, key))
    }
}
