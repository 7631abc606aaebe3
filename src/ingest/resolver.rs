//! Remote reference resolution
//!
//! Maps incoming object identifiers back to already-known statuses.
//! Resolution order: local tag-URI, local status URL, then the global
//! uri column. The URL-candidate expansion for remote permalinks is a
//! best-effort heuristic and never authoritative on its own.

use std::sync::Arc;
use url::Url;

use crate::data::{Database, Status};
use crate::error::Result;

pub struct RemoteReferenceResolver {
    db: Arc<Database>,
    local_domain: String,
}

impl RemoteReferenceResolver {
    pub fn new(db: Arc<Database>, local_domain: impl Into<String>) -> Self {
        Self {
            db,
            local_domain: local_domain.into(),
        }
    }

    /// Find the status a delivered identifier refers to, if we already
    /// hold it. A local-form identifier that misses still falls through
    /// to the uri column, since remote software sometimes references
    /// our objects by a spelling we never minted.
    pub async fn resolve(&self, identifier: &str) -> Result<Option<Status>> {
        if let Some(id) = self.local_tag_id(identifier) {
            if let Some(status) = self.db.get_status(&id).await? {
                return Ok(Some(status));
            }
        }
        if let Some(id) = self.local_url_id(identifier) {
            if let Some(status) = self.db.get_status(&id).await? {
                return Ok(Some(status));
            }
        }
        self.db.get_status_by_uri(identifier).await
    }

    /// Extract the status id from a local OStatus-era tag URI:
    /// `tag:<domain>,<date>:objectId=<id>:objectType=Status`
    fn local_tag_id(&self, identifier: &str) -> Option<String> {
        let rest = identifier.strip_prefix("tag:")?;
        let (authority, rest) = rest.split_once(':')?;
        let (domain, _date) = authority.split_once(',')?;
        if domain != self.local_domain {
            return None;
        }

        let mut object_id = None;
        let mut object_type_status = false;
        for part in rest.split(':') {
            if let Some(id) = part.strip_prefix("objectId=") {
                object_id = Some(id.to_string());
            } else if let Some(kind) = part.strip_prefix("objectType=") {
                object_type_status = kind == "Status";
            }
        }
        if !object_type_status {
            return None;
        }
        object_id.filter(|id| !id.is_empty())
    }

    /// Extract the status id from a local permalink:
    /// `https://<domain>/users/<name>/statuses/<id>`
    fn local_url_id(&self, identifier: &str) -> Option<String> {
        let url = Url::parse(identifier).ok()?;
        if url.host_str() != Some(self.local_domain.as_str()) {
            return None;
        }

        let mut segments = url.path_segments()?;
        if segments.next() != Some("users") {
            return None;
        }
        let _username = segments.next()?;
        if segments.next() != Some("statuses") {
            return None;
        }
        let id = segments.next()?;
        if segments.next().is_some() || id.is_empty() {
            return None;
        }
        Some(id.to_string())
    }

    /// Resolve trying every known spelling of a remote permalink.
    pub async fn resolve_with_candidates(&self, identifier: &str) -> Result<Option<Status>> {
        if let Some(status) = self.resolve(identifier).await? {
            return Ok(Some(status));
        }
        for candidate in federated_url_candidates(identifier) {
            if candidate == identifier {
                continue;
            }
            if let Some(status) = self.db.get_status_by_uri(&candidate).await? {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }
}

/// Alternate forms a remote object reference might have been recorded
/// under. For permalinks: trailing-slash and scheme variations peer
/// software is known to emit for the same object. For foreign tag-URIs:
/// permalink shapes rebuilt from host + objectId. Best-effort only;
/// missing for valid inputs is normal.
pub fn federated_url_candidates(identifier: &str) -> Vec<String> {
    if let Some(rest) = identifier.strip_prefix("tag:") {
        let host = rest.split_once(',').map(|(host, _)| host);
        let object_id = rest
            .split(':')
            .find_map(|part| part.strip_prefix("objectId="));
        if let (Some(host), Some(id)) = (host, object_id) {
            if !host.is_empty() && !id.is_empty() {
                return vec![
                    identifier.to_string(),
                    format!("https://{}/statuses/{}", host, id),
                    format!("http://{}/statuses/{}", host, id),
                ];
            }
        }
        return vec![identifier.to_string()];
    }

    let Ok(url) = Url::parse(identifier) else {
        return vec![identifier.to_string()];
    };
    if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
        return vec![identifier.to_string()];
    }

    let mut candidates = vec![identifier.to_string()];

    let toggled_slash = if identifier.ends_with('/') {
        identifier.trim_end_matches('/').to_string()
    } else {
        format!("{}/", identifier)
    };
    candidates.push(toggled_slash);

    let other_scheme = if url.scheme() == "https" { "http" } else { "https" };
    for candidate in candidates.clone() {
        let swapped = format!(
            "{}:{}",
            other_scheme,
            candidate.split_once(':').map(|(_, rest)| rest).unwrap_or("")
        );
        candidates.push(swapped);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Account, ConversationChoice, EntityId, NewStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn create_resolver() -> (RemoteReferenceResolver, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("resolver.db"))
                .await
                .unwrap(),
        );
        let resolver = RemoteReferenceResolver::new(Arc::clone(&db), "example.com");
        (resolver, db, temp_dir)
    }

    async fn seed_status(db: &Database, uri: &str, local: bool) -> String {
        let account = Account {
            id: EntityId::new().0,
            uri: format!("https://somewhere.example/users/{}", EntityId::new().0),
            username: "author".to_string(),
            domain: (!local).then(|| "somewhere.example".to_string()),
            display_name: None,
            suspended: false,
            created_at: Utc::now(),
        };
        db.insert_account_if_missing(&account).await.unwrap();

        let new = NewStatus {
            id: EntityId::new().0,
            uri: uri.to_string(),
            text: "<p>seed</p>".to_string(),
            content_warning: None,
            visibility: "public".to_string(),
            language: None,
            account_id: account.id,
            in_reply_to_id: None,
            reblog_of_id: None,
            conversation: ConversationChoice::Local,
            local,
            created_at: Utc::now(),
            mention_account_ids: vec![],
            tag_names: vec![],
            media: vec![],
            emojis: vec![],
        };
        db.materialize_status(&new).await.unwrap().status.id
    }

    #[tokio::test]
    async fn resolves_local_tag_uri_by_object_id() {
        let (resolver, db, _temp_dir) = create_resolver().await;
        let id = seed_status(&db, "https://example.com/users/alice/statuses/local-1", true).await;

        let found = resolver
            .resolve(&format!(
                "tag:example.com,2024-01-01:objectId={}:objectType=Status",
                id
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);

        // Foreign domain in the tag authority is not ours to resolve.
        assert!(
            resolver
                .resolve(&format!(
                    "tag:elsewhere.example,2024-01-01:objectId={}:objectType=Status",
                    id
                ))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn resolves_local_permalink_by_path_id() {
        let (resolver, db, _temp_dir) = create_resolver().await;
        let id = seed_status(&db, "tag:example.com,2024:objectId=1:objectType=Status", true).await;

        let found = resolver
            .resolve(&format!("https://example.com/users/alice/statuses/{}", id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);

        assert!(
            resolver
                .resolve(&format!("https://example.com/users/alice/notes/{}", id))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn falls_back_to_uri_column_for_remote_identifiers() {
        let (resolver, db, _temp_dir) = create_resolver().await;
        let uri = "https://remote.example/statuses/42";
        let id = seed_status(&db, uri, false).await;

        let found = resolver.resolve(uri).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(
            resolver
                .resolve("https://remote.example/statuses/43")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn candidate_expansion_matches_slash_and_scheme_variants() {
        let (resolver, db, _temp_dir) = create_resolver().await;
        let id = seed_status(&db, "http://remote.example/notice/7/", false).await;

        let found = resolver
            .resolve_with_candidates("https://remote.example/notice/7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
    }

    #[test]
    fn candidate_expansion_covers_slash_and_scheme_variants() {
        let candidates = federated_url_candidates("https://remote.example/notice/7");
        assert!(candidates.contains(&"https://remote.example/notice/7/".to_string()));
        assert!(candidates.contains(&"http://remote.example/notice/7".to_string()));
        assert!(candidates.contains(&"http://remote.example/notice/7/".to_string()));
    }

    #[test]
    fn candidate_expansion_rebuilds_permalinks_from_foreign_tag_uris() {
        let candidates =
            federated_url_candidates("tag:remote.example,2024:objectId=7:objectType=Status");
        assert!(candidates.contains(&"https://remote.example/statuses/7".to_string()));
        assert!(candidates.contains(&"http://remote.example/statuses/7".to_string()));

        // Nothing to rebuild from, so the identifier stands alone.
        assert_eq!(
            federated_url_candidates("tag:remote.example,2024:objectType=Status"),
            vec!["tag:remote.example,2024:objectType=Status".to_string()]
        );
        assert_eq!(
            federated_url_candidates("urn:uuid:not-a-permalink"),
            vec!["urn:uuid:not-a-permalink".to_string()]
        );
    }
}
