//! Sonarr (episodes) API shape.

use serde_json::{json, Value};

use crate::backends::arr_http::{bool_field, parse_date, ArrHttpClient};
use crate::backends::ManagerBackend;
use crate::error::HuntError;
use crate::protocol::{WantedItem, WantedKind, WantedPage};

pub struct SonarrBackend {
    client: ArrHttpClient,
}

impl SonarrBackend {
    pub fn new(client: ArrHttpClient) -> Self {
        Self { client }
    }

    fn episode_label(record: &Value) -> String {
        let series_title = record
            .get("series")
            .and_then(|series| series.get("title"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        let season = record.get("seasonNumber").and_then(Value::as_i64);
        let episode = record.get("episodeNumber").and_then(Value::as_i64);
        match (season, episode) {
            (Some(season), Some(episode)) => format!("{series_title} S{season:02}E{episode:02}"),
            _ => format!("{series_title} S?E?"),
        }
    }

    /// An episode counts as monitored only when its series is monitored too.
    pub fn parse_episode(record: &Value, kind: WantedKind) -> Option<WantedItem> {
        let item_id = record.get("id")?.as_i64()?;
        let series_monitored = record
            .get("series")
            .map(|series| bool_field(series, "monitored"))
            .unwrap_or(false);
        Some(WantedItem {
            item_id,
            monitored: series_monitored && bool_field(record, "monitored"),
            release_date: parse_date(record.get("airDateUtc")),
            kind,
            label: Self::episode_label(record),
        })
    }
}

impl ManagerBackend for SonarrBackend {
    fn system_version(&self) -> Result<String, HuntError> {
        self.client.system_version()
    }

    fn fetch_wanted(
        &self,
        kind: WantedKind,
        page: u32,
        page_size: u32,
        monitored_only: bool,
    ) -> Result<WantedPage, HuntError> {
        self.client.fetch_wanted_page(
            kind,
            &[
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
                ("includeSeries", "true".to_string()),
                // `monitored=false` makes the server return only unmonitored
                // records, not all of them.
                ("monitored", monitored_only.to_string()),
            ],
            Self::parse_episode,
        )
    }

    fn trigger_search(&self, item_id: i64) -> Result<(), HuntError> {
        self.client.post_command(
            item_id,
            &json!({ "name": "EpisodeSearch", "episodeIds": [item_id] }),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::SonarrBackend;
    use crate::backends::arr_http::ArrHttpClient;
    use crate::backends::test_server::ScriptedServer;
    use crate::backends::ManagerBackend;
    use crate::protocol::WantedKind;
    use crate::retry::RetryPolicy;

    fn backend_for(server: &ScriptedServer) -> SonarrBackend {
        SonarrBackend::new(ArrHttpClient::new(
            "Main",
            &server.base_url,
            "sonarr-key",
            5,
            RetryPolicy::immediate(1),
        ))
    }

    #[test]
    fn test_parse_episode_normalizes_fields() {
        let record = json!({
            "id": 4021,
            "seasonNumber": 2,
            "episodeNumber": 7,
            "monitored": true,
            "airDateUtc": "2023-11-05T02:00:00Z",
            "series": { "title": "Example Show", "monitored": true }
        });
        let item = SonarrBackend::parse_episode(&record, WantedKind::Missing)
            .expect("episode with id should parse");
        assert_eq!(item.item_id, 4021);
        assert!(item.monitored);
        assert_eq!(item.kind, WantedKind::Missing);
        assert_eq!(item.label, "Example Show S02E07");
        assert_eq!(
            item.release_date,
            Utc.with_ymd_and_hms(2023, 11, 5, 2, 0, 0).single()
        );
    }

    #[test]
    fn test_unmonitored_series_makes_episode_unmonitored() {
        let record = json!({
            "id": 1,
            "monitored": true,
            "series": { "title": "Dropped", "monitored": false }
        });
        let item = SonarrBackend::parse_episode(&record, WantedKind::Upgrade)
            .expect("episode with id should parse");
        assert!(!item.monitored);
        assert_eq!(item.release_date, None);
        assert_eq!(item.label, "Dropped S?E?");
    }

    #[test]
    fn test_episode_without_series_is_unmonitored() {
        let record = json!({ "id": 9, "monitored": true });
        let item = SonarrBackend::parse_episode(&record, WantedKind::Missing)
            .expect("episode with id should parse");
        assert!(!item.monitored);
        assert_eq!(item.label, "? S?E?");
    }

    #[test]
    fn test_episode_without_id_is_rejected() {
        assert!(SonarrBackend::parse_episode(&json!({ "monitored": true }), WantedKind::Missing)
            .is_none());
    }

    #[test]
    fn test_fetch_wanted_sends_paging_and_monitored_params() {
        let server = ScriptedServer::start(vec![(
            200,
            r#"{"totalRecords":240,"records":[{"id":11,"monitored":true,
                "series":{"title":"Show","monitored":true}}]}"#,
        )]);
        let page = backend_for(&server)
            .fetch_wanted(WantedKind::Upgrade, 2, 50, true)
            .expect("page fetch");

        assert_eq!(page.total_count, 240);
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].monitored);
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].target,
            "/api/v3/wanted/cutoff?page=2&pageSize=50&includeSeries=true&monitored=true"
        );
        assert_eq!(requests[0].header("X-Api-Key"), Some("sonarr-key"));
    }

    #[test]
    fn test_trigger_search_posts_episode_search_command() {
        let server = ScriptedServer::start(vec![(201, r#"{"id":900,"name":"EpisodeSearch"}"#)]);
        backend_for(&server).trigger_search(4021).expect("command accepted");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/api/v3/command");
        assert_eq!(requests[0].header("X-Api-Key"), Some("sonarr-key"));
        let body: Value = serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body, json!({ "name": "EpisodeSearch", "episodeIds": [4021] }));
    }
}
