use crate::asset::{AssetType, NATIVE, asset_to_object};
use crate::config::ApiConfig;
use crate::finder::PathFinder;
use crate::sync::{GraphHandle, LedgerSource};
use axum::{Router, extract::Query, extract::State, http::StatusCode, response::Json, routing::get};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Fixed-point scale between boundary decimal amounts and the graph's
/// internal representation (7 fractional digits). Applied exactly once on the
/// way in and undone exactly once on the way out.
const AMOUNT_SCALE: f64 = 1e7;

type ApiError = (StatusCode, Json<Value>);
type ApiResponse = Result<Json<Value>, ApiError>;

/// Query endpoint over the current graph snapshot.
pub struct ApiServer {
    config: ApiConfig,
    state: ApiState,
}

#[derive(Clone)]
struct ApiState {
    graph: GraphHandle,
    source: Arc<dyn LedgerSource>,
    finder: Arc<PathFinder>,
}

impl ApiServer {
    pub fn new(
        config: ApiConfig,
        graph: GraphHandle,
        source: Arc<dyn LedgerSource>,
        finder: Arc<PathFinder>,
    ) -> Self {
        Self { config, state: ApiState { graph, source, finder } }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&format!("{}/paths", self.config.prefix), get(find_paths))
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> eyre::Result<()> {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.config.port)).await?;
        info!("Listening to port {}", self.config.port);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PathsQuery {
    source_account: Option<String>,
    destination_amount: Option<String>,
    destination_asset_type: Option<String>,
    destination_asset_code: Option<String>,
    destination_asset_issuer: Option<String>,
}

/// Validated request: the canonical destination identity plus the amount both
/// as given (echoed back) and parsed.
struct ValidQuery {
    source_account: String,
    dest_asset: String,
    dest_amount_raw: String,
    dest_amount: f64,
}

/// `GET /paths`: payment-paths listing for a source account and a desired
/// destination amount.
async fn find_paths(State(state): State<ApiState>, Query(query): Query<PathsQuery>) -> ApiResponse {
    let query = validate_query(&query)?;

    let mut targets =
        state.source.account_assets(&query.source_account).await.map_err(request_failed)?;
    targets.push(NATIVE.to_string());

    let snapshot = state.graph.snapshot();

    let started = Instant::now();
    let paths =
        state.finder.find_paths(&snapshot, &targets, &query.dest_asset, query.dest_amount * AMOUNT_SCALE);
    debug!("find_paths(): {:?}", started.elapsed());

    let mut dest_record = asset_to_object(
        &query.dest_asset,
        ["destination_asset_type", "destination_asset_code", "destination_asset_issuer"],
    );
    if let Some(record) = dest_record.as_object_mut() {
        record.insert("destination_amount".to_string(), Value::String(query.dest_amount_raw.clone()));
    }

    let mut records: Vec<Value> = Vec::new();
    for (source_asset, found) in &paths {
        let source_record = asset_to_object(
            source_asset,
            ["source_asset_type", "source_asset_code", "source_asset_issuer"],
        );

        for path in found {
            let hops: Vec<Value> = path
                .hops
                .iter()
                .map(|hop| asset_to_object(hop, ["asset_type", "asset_code", "asset_issuer"]))
                .collect();

            let mut record = Map::new();
            record.insert("source_amount".to_string(), Value::String(descale(path.source_amount)));
            record.insert("path".to_string(), Value::Array(hops));
            merge_into(&mut record, &source_record);
            merge_into(&mut record, &dest_record);

            records.push(Value::Object(record));
        }
    }

    Ok(Json(json!({ "_embedded": { "records": records } })))
}

fn merge_into(record: &mut Map<String, Value>, fields: &Value) {
    if let Some(fields) = fields.as_object() {
        for (key, value) in fields {
            record.insert(key.clone(), value.clone());
        }
    }
}

/// Render an internal scaled amount back to boundary decimal form with the
/// full 7 fractional digits.
fn descale(amount: f64) -> String {
    format!("{:.7}", amount / AMOUNT_SCALE)
}

fn validate_query(query: &PathsQuery) -> Result<ValidQuery, ApiError> {
    let dest_amount_raw = query.destination_amount.clone().unwrap_or_default();
    let dest_amount = match dest_amount_raw.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 && !dest_amount_raw.is_empty() => amount,
        _ => return Err(bad_request("destination_amount", "Value must be positive")),
    };

    let source_account = match query.source_account.as_deref() {
        Some(account) if is_valid_account_id(account) => account.to_string(),
        _ => return Err(bad_request("source_account", "invalid address")),
    };

    let asset_type = match query.destination_asset_type.as_deref().map(AssetType::from_str) {
        Some(Ok(asset_type)) => asset_type,
        _ => {
            return Err(bad_request(
                "destination_asset_type",
                "invalid asset type: was not one of 'native', 'credit_alphanum4', 'credit_alphanum12'",
            ));
        }
    };

    if asset_type.is_native() {
        return Ok(ValidQuery {
            source_account,
            dest_asset: NATIVE.to_string(),
            dest_amount_raw,
            dest_amount,
        });
    }

    let issuer = match query.destination_asset_issuer.as_deref() {
        Some(issuer) if is_valid_account_id(issuer) => issuer,
        _ => return Err(bad_request("destination_asset_issuer", "invalid address")),
    };

    let code = match query.destination_asset_code.as_deref() {
        Some(code)
            if !code.is_empty()
                && (asset_type != AssetType::CreditAlphanum4 || code.len() <= 4) =>
        {
            code
        }
        _ => return Err(bad_request("destination_asset_code", "code too long")),
    };

    Ok(ValidQuery {
        source_account,
        dest_asset: format!("{issuer}:{code}"),
        dest_amount_raw,
        dest_amount,
    })
}

/// Plausibility check for an ed25519 public-key account id: 56 characters,
/// `G` prefix, base32 alphabet.
fn is_valid_account_id(account: &str) -> bool {
    account.len() == 56
        && account.starts_with('G')
        && account.bytes().all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

fn bad_request(field: &str, reason: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "type": "https://stellar.org/horizon-errors/bad_request",
            "title": "Bad Request",
            "status": 400,
            "detail": "The request you sent was invalid in some way",
            "extras": {
                "invalid_field": field,
                "reason": reason,
            }
        })),
    )
}

/// Failures while resolving the request render the same document the
/// validation errors use, carrying the underlying error in `extras`.
fn request_failed(error: crate::sync::SourceError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "type": "https://stellar.org/horizon-errors/bad_request",
            "title": "Bad Request",
            "status": 400,
            "detail": "The request you sent was invalid in some way",
            "extras": {
                "reason": error.to_string(),
            }
        })),
    )
}
