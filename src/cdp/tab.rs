//! Tab discovery against the browser's debugging endpoint.
//!
//! The endpoint's `/json` resource lists every debuggable target; only
//! targets of type `"page"` are user-visible tabs. The listing is fetched
//! fresh on every call — tabs open and close outside the bridge's control,
//! so a cached listing could name a target that no longer exists.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BridgeSettings;
use crate::error::{BridgeError, BridgeResult};

/// One debuggable target as reported by the endpoint's listing resource.
///
/// This is a read-only view of browser state; the bridge never owns or
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    /// Stable identifier for the lifetime of the target.
    #[serde(default)]
    pub id: String,

    /// Current URL of the target.
    #[serde(default)]
    pub url: String,

    /// Current document title.
    #[serde(default)]
    pub title: String,

    /// Target type; only `"page"` targets are tabs.
    #[serde(rename = "type", default)]
    pub target_type: String,

    /// Per-target websocket debugger address.
    #[serde(
        rename = "webSocketDebuggerUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ws_url: Option<String>,
}

impl Tab {
    /// Whether this target is a user-visible tab.
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// Selects one tab from a page listing by URL fragment.
///
/// Matching is a case-insensitive substring test against each tab's URL.
/// When several tabs match, the first one in the endpoint's listing order
/// wins (`first-listed` policy — deliberate and documented, so callers can
/// predict which tab a fragment lands on). Without a fragment the first
/// listed page is used.
pub fn select_tab<'a>(tabs: &'a [Tab], fragment: Option<&str>) -> BridgeResult<&'a Tab> {
    let available = || tabs.iter().map(|t| t.url.clone()).collect::<Vec<_>>();

    match fragment {
        Some(fragment) => {
            let needle = fragment.to_lowercase();
            tabs.iter()
                .find(|t| t.url.to_lowercase().contains(&needle))
                .ok_or_else(|| BridgeError::TabNotFound {
                    fragment: fragment.to_string(),
                    available: available(),
                })
        }
        None => tabs.first().ok_or_else(|| BridgeError::TabNotFound {
            fragment: "(any page)".to_string(),
            available: available(),
        }),
    }
}

/// Queries the debugging endpoint for live tabs and resolves URL fragments
/// to targets.
#[derive(Debug, Clone)]
pub struct TabRegistry {
    http: reqwest::Client,
    base_url: String,
}

impl TabRegistry {
    /// Creates a registry bound to the configured debugging endpoint.
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.endpoint_url(),
        }
    }

    /// The endpoint base URL this registry queries.
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Fetches the current page-tab listing.
    ///
    /// Any failure to reach or decode the listing resource surfaces as
    /// [`BridgeError::BridgeUnreachable`] — distinct from `TabNotFound`,
    /// which means the endpoint answered but nothing matched.
    pub async fn list(&self) -> BridgeResult<Vec<Tab>> {
        let url = format!("{}/json", self.base_url);

        let unreachable = |message: String| BridgeError::BridgeUnreachable {
            endpoint: self.base_url.clone(),
            message,
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| unreachable(e.to_string()))?;

        let targets: Vec<Tab> = response
            .json()
            .await
            .map_err(|e| unreachable(format!("invalid tab listing: {e}")))?;

        let pages: Vec<Tab> = targets.into_iter().filter(Tab::is_page).collect();
        debug!(count = pages.len(), endpoint = %self.base_url, "listed page tabs");
        Ok(pages)
    }

    /// Resolves a URL fragment to one live tab.
    pub async fn resolve(&self, fragment: Option<&str>) -> BridgeResult<Tab> {
        let tabs = self.list().await?;
        select_tab(&tabs, fragment).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: &str, url: &str, target_type: &str) -> Tab {
        Tab {
            id: id.to_string(),
            url: url.to_string(),
            title: String::new(),
            target_type: target_type.to_string(),
            ws_url: Some(format!("ws://localhost:18800/devtools/page/{id}")),
        }
    }

    #[test]
    fn test_page_filter_drops_background_targets() {
        let targets = vec![
            tab("A", "https://x.com/home", "page"),
            tab("B", "https://mail.com", "background_page"),
        ];
        let pages: Vec<Tab> = targets.into_iter().filter(Tab::is_page).collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, "A");
    }

    #[test]
    fn test_select_tab_case_insensitive_substring() {
        let tabs = vec![
            tab("A", "https://x.com/home", "page"),
            tab("B", "https://mail.com/inbox", "page"),
        ];
        assert_eq!(select_tab(&tabs, Some("X.COM")).unwrap().id, "A");
        assert_eq!(select_tab(&tabs, Some("mail")).unwrap().id, "B");
    }

    #[test]
    fn test_select_tab_zero_matches_is_an_error() {
        let tabs = vec![tab("A", "https://x.com/home", "page")];
        let err = select_tab(&tabs, Some("github.com")).unwrap_err();
        match err {
            BridgeError::TabNotFound {
                fragment,
                available,
            } => {
                assert_eq!(fragment, "github.com");
                assert_eq!(available, vec!["https://x.com/home".to_string()]);
            }
            other => panic!("expected TabNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_select_tab_first_listed_wins_on_multiple_matches() {
        let tabs = vec![
            tab("A", "https://x.com/home", "page"),
            tab("B", "https://x.com/messages", "page"),
        ];
        assert_eq!(select_tab(&tabs, Some("x.com")).unwrap().id, "A");
    }

    #[test]
    fn test_select_tab_is_idempotent() {
        let tabs = vec![
            tab("A", "https://x.com/home", "page"),
            tab("B", "https://x.com/messages", "page"),
        ];
        let first = select_tab(&tabs, Some("x.com")).unwrap().id.clone();
        let second = select_tab(&tabs, Some("x.com")).unwrap().id.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_select_tab_without_fragment_takes_first_page() {
        let tabs = vec![
            tab("A", "https://x.com/home", "page"),
            tab("B", "https://mail.com", "page"),
        ];
        assert_eq!(select_tab(&tabs, None).unwrap().id, "A");

        let err = select_tab(&[], None).unwrap_err();
        assert_eq!(err.kind(), "tab_not_found");
    }

    #[tokio::test]
    async fn test_list_surfaces_bridge_unreachable() {
        // Bind a listener to reserve a local port, then drop it so the
        // registry's request is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = BridgeSettings::default().with_cdp_url(format!("http://127.0.0.1:{port}"));
        let registry = TabRegistry::new(&settings);

        let err = registry.list().await.unwrap_err();
        assert_eq!(err.kind(), "bridge_unreachable");

        // resolve() propagates the same failure without inventing a tab.
        let err = registry.resolve(Some("x.com")).await.unwrap_err();
        assert_eq!(err.kind(), "bridge_unreachable");
    }
}
