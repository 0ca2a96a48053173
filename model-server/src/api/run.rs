//! The execution endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use inference_common::envelope::into_object;
use inference_common::notification::KIND_LOG;
use inference_common::protocol::{CALL_ID, CLIENT, ERROR, ERROR_TYPE, TIME, WORKER_SIGNATURE};
use inference_common::timefmt::now_str;
use inference_common::ApiParams;

use crate::state::AppState;

/// Run the request on a free worker and stamp the answer.
///
/// `OPTIONS` never reaches this handler: the CORS layer answers it.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    method: Method,
    params: ApiParams,
) -> Response {
    let call_id = state.next_call_id();
    let client = params.get_str(CLIENT).unwrap_or_else(|| "unk".to_string());

    state.notifications.push_for_call(
        call_id,
        KIND_LOG,
        format!(
            "Received '{}' request {} from client '{}' params: {}",
            method,
            call_id,
            client,
            Value::Object(params.0.clone())
        ),
    );

    let inputs = params.0.clone();
    match state.pool.dispatch(inputs, call_id).await {
        Ok(done) => {
            let mut answer = into_object(done.value);
            answer.insert(CALL_ID.to_string(), json!(call_id));
            answer.insert(TIME.to_string(), json!(now_str()));
            answer.insert(
                WORKER_SIGNATURE.to_string(),
                json!(format!(
                    "{}:{}:{}",
                    state.info.worker_name, state.info.class_name, done.slot
                )),
            );
            Json(Value::Object(answer)).into_response()
        }
        Err(e) => {
            tracing::error!("Call {} from '{}' failed: {}", call_id, client, e);
            let (status, error_type) = e.status_and_type();
            let body = json!({
                ERROR: e.to_string(),
                ERROR_TYPE: error_type,
                CLIENT: client,
                CALL_ID: call_id,
                "input": params.into_value(),
                TIME: now_str(),
            });
            (status, Json(body)).into_response()
        }
    }
}
