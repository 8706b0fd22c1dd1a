//! Branch-protection rule evaluation (§4.4 "Protection enforcement"),
//! backed by the `branch_protection` table.

use sea_orm::{DatabaseConnection, EntityTrait};

use crate::errors::CellError;
use crate::schema::branch_protection;

#[derive(Debug, Clone)]
pub struct ProtectionRule {
    pub pattern: String,
    pub required_reviews: i32,
    pub prevent_force_push: bool,
    pub prevent_deletion: bool,
}

/// Glob match supporting a single trailing `*` wildcard, the common case for
/// branch-protection patterns (`release/*`, `main`).
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else {
        pattern == name
    }
}

/// Finds the highest-priority (longest matching pattern) enabled rule for `ref_name`.
pub async fn find_matching_rule(db: &DatabaseConnection, ref_name: &str) -> Result<Option<ProtectionRule>, CellError> {
    let rows = branch_protection::Entity::find().all(db).await?;
    let mut best: Option<(&branch_protection::Model, usize)> = None;
    for row in &rows {
        if !row.enabled {
            continue;
        }
        if glob_match(&row.pattern, ref_name) {
            let specificity = row.pattern.trim_end_matches('*').len();
            if best.as_ref().is_none_or(|(_, s)| specificity > *s) {
                best = Some((row, specificity));
            }
        }
    }
    Ok(best.map(|(row, _)| ProtectionRule {
        pattern: row.pattern.clone(),
        required_reviews: row.required_reviews,
        prevent_force_push: row.prevent_force_push,
        prevent_deletion: row.prevent_deletion,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_pattern_matches_prefix() {
        assert!(glob_match("release/*", "release/1.0"));
        assert!(!glob_match("release/*", "main"));
        assert!(glob_match("main", "main"));
    }
}
