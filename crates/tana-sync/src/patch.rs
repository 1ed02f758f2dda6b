use serde_json::{Map, Value};

use crate::cache::RemoteCache;
use crate::key::{CacheKey, KeyPrefix};

/// Which rows of a cached list a [`OptimisticPatch::PatchListItems`] touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTarget {
    /// The single item whose `id` field equals the given id.
    Item(String),
    /// Every item in the list.
    All,
}

/// An optimistic cache rewrite, applied before the server confirms.
///
/// A closed set of shapes rather than arbitrary callbacks, so rollback can
/// snapshot exactly the entries a patch touches.
#[derive(Debug, Clone)]
pub enum OptimisticPatch {
    /// Replace one entry's payload wholesale.
    ReplaceEntity { key: CacheKey, value: Value },
    /// Shallow-merge fields into one entry's payload object.
    MergeFields {
        key: CacheKey,
        fields: Map<String, Value>,
    },
    /// Shallow-merge fields into matching items of every cached list under
    /// the prefix. Lists are either page payloads (`{ items: [...] }`) or
    /// bare arrays.
    PatchListItems {
        prefix: KeyPrefix,
        target: ListTarget,
        fields: Map<String, Value>,
    },
}

impl OptimisticPatch {
    /// Apply to the cache, returning the prior value of every touched entry
    /// in application order. The caller keeps these for rollback.
    pub(crate) fn apply(&self, cache: &RemoteCache) -> Vec<(CacheKey, Option<Value>)> {
        match self {
            OptimisticPatch::ReplaceEntity { key, value } => {
                let prior = cache.get(key);
                cache.write(key.clone(), value.clone());
                vec![(key.clone(), prior)]
            }
            OptimisticPatch::MergeFields { key, fields } => {
                // Nothing cached means nothing to patch; the confirming
                // refetch will bring the canonical value.
                let Some(mut current) = cache.get(key) else {
                    return Vec::new();
                };
                let prior = current.clone();
                if let Some(obj) = current.as_object_mut() {
                    for (k, v) in fields {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                cache.write(key.clone(), current);
                vec![(key.clone(), Some(prior))]
            }
            OptimisticPatch::PatchListItems {
                prefix,
                target,
                fields,
            } => {
                let mut snapshots = Vec::new();
                for key in cache.keys_matching(prefix) {
                    let Some(mut value) = cache.get(&key) else {
                        continue;
                    };
                    let prior = value.clone();
                    if !patch_items(&mut value, target, fields) {
                        continue;
                    }
                    cache.write(key.clone(), value);
                    snapshots.push((key, Some(prior)));
                }
                snapshots
            }
        }
    }
}

fn patch_items(list: &mut Value, target: &ListTarget, fields: &Map<String, Value>) -> bool {
    let items = if list.is_array() {
        list.as_array_mut()
    } else {
        list.get_mut("items").and_then(Value::as_array_mut)
    };
    let Some(items) = items else {
        return false;
    };

    let mut changed = false;
    for item in items {
        let hit = match target {
            ListTarget::All => true,
            ListTarget::Item(id) => item.get("id").and_then(Value::as_str) == Some(id.as_str()),
        };
        if !hit {
            continue;
        }
        if let Some(obj) = item.as_object_mut() {
            for (k, v) in fields {
                obj.insert(k.clone(), v.clone());
            }
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn board_key() -> CacheKey {
        CacheKey::TaskList {
            project_id: "p-1".to_string(),
            sig: "pageSize=200".to_string(),
        }
    }

    #[tokio::test]
    async fn replace_entity_snapshots_prior_value() {
        let cache = RemoteCache::default();
        cache.write(CacheKey::UnreadCount, json!({ "count": 5 }));

        let patch = OptimisticPatch::ReplaceEntity {
            key: CacheKey::UnreadCount,
            value: json!({ "count": 4 }),
        };
        let snapshot = patch.apply(&cache);

        assert_eq!(cache.get(&CacheKey::UnreadCount).unwrap()["count"], 4);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.as_ref().unwrap()["count"], 5);
    }

    #[tokio::test]
    async fn merge_fields_on_missing_entry_is_a_noop() {
        let cache = RemoteCache::default();
        let patch = OptimisticPatch::MergeFields {
            key: CacheKey::Preferences,
            fields: fields(&[("taskAssigned", json!(["email"]))]),
        };
        assert!(patch.apply(&cache).is_empty());
        assert!(cache.get(&CacheKey::Preferences).is_none());
    }

    #[tokio::test]
    async fn patch_list_items_rewrites_single_item_in_page_payload() {
        let cache = RemoteCache::default();
        cache.write(
            board_key(),
            json!({
                "items": [
                    { "id": "t-1", "status": "todo" },
                    { "id": "t-2", "status": "todo" },
                ],
                "total": 2, "page": 1, "pageSize": 200, "hasMore": false
            }),
        );

        let patch = OptimisticPatch::PatchListItems {
            prefix: KeyPrefix::Key(board_key()),
            target: ListTarget::Item("t-2".to_string()),
            fields: fields(&[("status", json!("done"))]),
        };
        let snapshot = patch.apply(&cache);

        let page = cache.get(&board_key()).unwrap();
        assert_eq!(page["items"][0]["status"], "todo");
        assert_eq!(page["items"][1]["status"], "done");
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn patch_list_items_all_flips_every_row_and_bare_arrays() {
        let cache = RemoteCache::default();
        let key = CacheKey::NotificationList {
            sig: String::new(),
        };
        cache.write(
            key.clone(),
            json!({ "items": [ { "id": "n-1", "read": false }, { "id": "n-2", "read": false } ],
                    "total": 2, "page": 1, "pageSize": 20, "hasMore": false }),
        );

        let patch = OptimisticPatch::PatchListItems {
            prefix: KeyPrefix::NotificationLists,
            target: ListTarget::All,
            fields: fields(&[("read", json!(true))]),
        };
        patch.apply(&cache);

        let page = cache.get(&key).unwrap();
        assert_eq!(page["items"][0]["read"], true);
        assert_eq!(page["items"][1]["read"], true);

        // bare-array lists are patched the same way
        let members = CacheKey::ProjectMembers {
            project_id: "p-1".to_string(),
        };
        cache.write(members.clone(), json!([{ "id": "m-1", "role": "member" }]));
        let patch = OptimisticPatch::PatchListItems {
            prefix: KeyPrefix::ProjectMembers {
                project_id: "p-1".to_string(),
            },
            target: ListTarget::Item("m-1".to_string()),
            fields: fields(&[("role", json!("admin"))]),
        };
        patch.apply(&cache);
        assert_eq!(cache.get(&members).unwrap()[0]["role"], "admin");
    }
}
