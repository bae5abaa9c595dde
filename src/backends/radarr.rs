//! Radarr (movies) API shape.

use serde_json::{json, Value};

use crate::backends::arr_http::{bool_field, parse_date, ArrHttpClient};
use crate::backends::ManagerBackend;
use crate::error::HuntError;
use crate::protocol::{WantedItem, WantedKind, WantedPage};

/// Release fields consulted in order; the first present one wins, even when
/// it does not parse.
const RELEASE_DATE_FIELDS: [&str; 3] = ["releaseDate", "digitalRelease", "physicalRelease"];

pub struct RadarrBackend {
    client: ArrHttpClient,
}

impl RadarrBackend {
    pub fn new(client: ArrHttpClient) -> Self {
        Self { client }
    }

    pub fn parse_movie(record: &Value, kind: WantedKind) -> Option<WantedItem> {
        let item_id = record.get("id")?.as_i64()?;
        let title = record.get("title").and_then(Value::as_str).unwrap_or("?");
        let year = record
            .get("year")
            .and_then(Value::as_i64)
            .map(|year| year.to_string())
            .unwrap_or_else(|| "?".to_string());
        let release_date = RELEASE_DATE_FIELDS
            .iter()
            .filter_map(|field| record.get(*field))
            .find(|value| !value.is_null())
            .and_then(|value| parse_date(Some(value)));
        Some(WantedItem {
            item_id,
            monitored: bool_field(record, "monitored"),
            release_date,
            kind,
            label: format!("{title} ({year})"),
        })
    }
}

impl ManagerBackend for RadarrBackend {
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
                // `monitored=false` narrows to unmonitored movies only.
                ("monitored", monitored_only.to_string()),
            ],
            Self::parse_movie,
        )
    }

    fn trigger_search(&self, item_id: i64) -> Result<(), HuntError> {
        self.client.post_command(
            item_id,
            &json!({ "name": "MoviesSearch", "movieIds": [item_id] }),
        )
    }
}
