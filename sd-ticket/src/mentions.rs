use regex::Regex;
use sd_channels::UserDirectory;
use std::sync::LazyLock;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([A-Za-z0-9]+)>").expect("mention regex is valid"));

/// Distinct mentioned user ids, in order of first appearance.
pub fn mentioned_user_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in MENTION.captures_iter(text) {
        let Some(id) = caps.get(1) else {
            continue;
        };
        if !ids.iter().any(|existing| existing == id.as_str()) {
            ids.push(id.as_str().to_string());
        }
    }
    ids
}

/// Replace every `<@ID>` with `@name`. Lookup failures fall back to `@ID`.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn resolve_mentions(text: &str, directory: &dyn UserDirectory) -> String {
    let ids = mentioned_user_ids(text);
    if ids.is_empty() {
        return text.to_string();
    }

    let mut resolved = text.to_string();
    for id in ids {
        let name = match directory.lookup_user(&id).await {
            Ok(profile) => match profile.preferred_name() {
                Some(name) => name.to_string(),
                None => {
                    tracing::warn!(user_id = %id, "user profile has no usable name");
                    id.clone()
                }
            },
            Err(e) => {
                tracing::warn!(user_id = %id, %e, "user lookup failed; keeping raw id");
                id.clone()
            }
        };
        resolved = resolved.replace(&format!("<@{id}>"), &format!("@{name}"));
    }
    resolved
}
