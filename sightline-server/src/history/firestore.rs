use super::{check_id, check_record, HistoryStore};
use crate::auth::GoogleAuth;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Map, Value};
use sightline_core::config::{GoogleCloudConfig, HistoryConfig};
use sightline_core::DetectionResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// History backed by the Cloud Firestore REST API.
pub struct FirestoreHistoryStore {
    client: Client,
    documents_url: String,
    collection: String,
    auth: Arc<GoogleAuth>,
}

impl FirestoreHistoryStore {
    pub fn new(history: &HistoryConfig, google: &GoogleCloudConfig, auth: Arc<GoogleAuth>) -> Result<Self, StoreError> {
        let project = google
            .project_id
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("GOOGLE_CLOUD_PROJECT_ID is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                history.firestore_endpoint.trim_end_matches('/'),
                urlencoding::encode(project)
            ),
            collection: history.collection.clone(),
            auth,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, StoreError> {
        let request = self.auth.authorize(request).await?;
        let response = request.send().await.map_err(transport_error)?;
        read_body(response).await
    }

    async fn collection_ids(&self, page_size: Option<u32>) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({});
            if let Some(size) = page_size {
                body["pageSize"] = json!(size);
            }
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }

            let url = format!("{}:listCollectionIds", self.documents_url);
            let value = self.send(self.client.post(&url).json(&body)).await?;
            if let Some(found) = value["collectionIds"].as_array() {
                ids.extend(found.iter().filter_map(|v| v.as_str().map(str::to_string)));
            }

            page_token = value["nextPageToken"].as_str().map(str::to_string);
            if page_token.is_none() || page_size.is_some() {
                return Ok(ids);
            }
        }
    }
}

#[async_trait]
impl HistoryStore for FirestoreHistoryStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.collection_ids(Some(1)).await.map(|_| ())
    }

    async fn append(&self, result: &DetectionResult) -> Result<String, StoreError> {
        check_record(result)?;
        let fields = encode_record(result)?;
        let url = format!("{}/{}", self.documents_url, urlencoding::encode(&self.collection));
        let created = self.send(self.client.post(&url).json(&json!({ "fields": fields }))).await?;

        let name = created["name"]
            .as_str()
            .ok_or_else(|| StoreError::Backend("created document has no name".to_string()))?;
        let id = document_id(name).to_string();
        debug!("Created Firestore document {}", id);
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<DetectionResult>, StoreError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "orderBy": [{ "field": { "fieldPath": "timestamp" }, "direction": "DESCENDING" }],
                "limit": limit,
            }
        });
        let url = format!("{}:runQuery", self.documents_url);
        let rows = self.send(self.client.post(&url).json(&query)).await?;

        let mut out = Vec::new();
        for row in rows.as_array().into_iter().flatten() {
            if let Some(err) = row.get("error") {
                return Err(status_error(err));
            }
            if let Some(document) = row.get("document") {
                out.push(decode_document(document)?);
            }
        }
        Ok(out)
    }

    async fn get_by_id(&self, id: &str) -> Result<DetectionResult, StoreError> {
        check_id(id)?;
        let url = format!(
            "{}/{}/{}",
            self.documents_url,
            urlencoding::encode(&self.collection),
            urlencoding::encode(id)
        );
        match self.send(self.client.get(&url)).await {
            Ok(document) => decode_document(&document),
            Err(StoreError::NotFound(_)) => Err(StoreError::NotFound(format!("Detection '{}' not found", id))),
            Err(e) => Err(e),
        }
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        Ok(self.collection_ids(None).await?.iter().any(|c| c == &self.collection))
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

async fn read_body(response: Response) -> Result<Value, StoreError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    // Errors arrive either as {"error": {...}} or as [{"error": {...}}].
    let error = value
        .get("error")
        .or_else(|| value.get(0).and_then(|v| v.get("error")));
    match error {
        Some(err) => Err(status_error(err)),
        None => Err(StoreError::Backend(format!("HTTP {}: {}", status, text))),
    }
}

/// Translate a `google.rpc.Status` into a store error.
pub(crate) fn status_error(err: &Value) -> StoreError {
    let message = err["message"].as_str().unwrap_or_default().to_string();
    match err["status"].as_str().unwrap_or_default() {
        "UNAVAILABLE" | "DEADLINE_EXCEEDED" => StoreError::Unavailable(message),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => StoreError::InvalidQuery(message),
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => StoreError::PermissionDenied(message),
        "NOT_FOUND" => StoreError::NotFound(message),
        _ => StoreError::Backend(message),
    }
}

fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Typed Firestore value for an arbitrary JSON value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_f64() => json!({ "doubleValue": n }),
        Value::Number(n) => json!({ "integerValue": n.to_string() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn encode_fields(map: &Map<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect())
}

pub(crate) fn decode_value(value: &Value) -> Value {
    if let Some(s) = value.get("integerValue") {
        return match s {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        };
    }
    if let Some(n) = value.get("doubleValue") {
        return n.clone();
    }
    if let Some(b) = value.get("booleanValue") {
        return b.clone();
    }
    for key in ["stringValue", "timestampValue", "referenceValue"] {
        if let Some(s) = value.get(key) {
            return s.clone();
        }
    }
    if let Some(array) = value.get("arrayValue") {
        let values = array["values"].as_array().map(|v| v.iter().map(decode_value).collect()).unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = value.get("mapValue") {
        return decode_fields(&map["fields"]);
    }
    Value::Null
}

fn decode_fields(fields: &Value) -> Value {
    match fields.as_object() {
        Some(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect()),
        None => Value::Object(Map::new()),
    }
}

/// Document fields for a record; `timestamp` is stored as a native timestamp.
pub(crate) fn encode_record(result: &DetectionResult) -> Result<Value, StoreError> {
    let mut plain = serde_json::to_value(result).map_err(|e| StoreError::Backend(e.to_string()))?;
    let map = plain
        .as_object_mut()
        .ok_or_else(|| StoreError::Backend("record did not serialize to an object".to_string()))?;
    map.remove("id");

    let mut fields = encode_fields(map);
    fields["timestamp"] = json!({ "timestampValue": result.timestamp.to_rfc3339() });
    Ok(fields)
}

pub(crate) fn decode_document(document: &Value) -> Result<DetectionResult, StoreError> {
    let mut plain = decode_fields(&document["fields"]);
    if let Some(name) = document["name"].as_str() {
        plain["id"] = json!(document_id(name));
    }
    serde_json::from_value(plain).map_err(|e| StoreError::Backend(format!("malformed document: {}", e)))
}
