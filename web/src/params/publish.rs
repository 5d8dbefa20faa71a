use events::Publication;
use serde::Deserialize;

/// Body of `POST /publish`.
///
/// The publication fields sit next to `channels` in the same JSON object:
/// `{ "channels": ["news"], "id": "7", "event": "update", "data": "..." }`.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishParams {
    #[serde(default)]
    pub(crate) channels: Vec<String>,
    #[serde(flatten)]
    pub(crate) publication: Publication,
}
