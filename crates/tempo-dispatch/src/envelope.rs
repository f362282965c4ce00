// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Celery protocol v2 message envelope, as Redis-backed workers expect it
//! on the queue list.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::request::DispatchRequest;

#[derive(Debug, Serialize)]
pub struct Envelope {
	pub body: String,
	#[serde(rename = "content-encoding")]
	pub content_encoding: &'static str,
	#[serde(rename = "content-type")]
	pub content_type: &'static str,
	pub headers: Headers,
	pub properties: Properties,
}

#[derive(Debug, Serialize)]
pub struct Headers {
	pub lang: &'static str,
	pub task: String,
	pub id: String,
	pub root_id: String,
	pub parent_id: Option<String>,
	pub group: Option<String>,
	pub eta: Option<String>,
	pub expires: Option<String>,
	pub retries: u32,
	pub timelimit: [Option<u64>; 2],
	pub argsrepr: String,
	pub kwargsrepr: String,
	pub origin: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub periodic_task_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Properties {
	pub correlation_id: String,
	pub reply_to: String,
	pub delivery_mode: u8,
	pub delivery_info: DeliveryInfo,
	pub priority: u8,
	pub body_encoding: &'static str,
	pub delivery_tag: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveryInfo {
	pub exchange: String,
	pub routing_key: String,
}

/// Build the envelope for `request` under `dispatch_id`. Returns the target
/// queue and the envelope.
pub fn build(
	request: &DispatchRequest,
	dispatch_id: Uuid,
	default_queue: &str,
	origin: &str,
) -> Result<(String, Envelope)> {
	request.validate()?;

	let queue = request
		.routing
		.queue
		.clone()
		.unwrap_or_else(|| default_queue.to_string());
	let routing_key = request
		.routing
		.routing_key
		.clone()
		.unwrap_or_else(|| queue.clone());
	let exchange = request.routing.exchange.clone().unwrap_or_default();

	let args = Value::Array(request.args.clone());
	let kwargs = Value::Object(request.kwargs.clone());
	let body = json!([
		args,
		kwargs,
		{"callbacks": null, "errbacks": null, "chain": null, "chord": null}
	]);
	let body = STANDARD.encode(serde_json::to_vec(&body)?);

	let id = dispatch_id.to_string();
	let envelope = Envelope {
		body,
		content_encoding: "utf-8",
		content_type: "application/json",
		headers: Headers {
			lang: "py",
			task: request.task.clone(),
			id: id.clone(),
			root_id: id.clone(),
			parent_id: None,
			group: None,
			eta: None,
			expires: request
				.expires
				.map(|e| e.to_rfc3339_opts(SecondsFormat::Micros, false)),
			retries: 0,
			timelimit: [None, None],
			argsrepr: serde_json::to_string(&args)?,
			kwargsrepr: serde_json::to_string(&kwargs)?,
			origin: origin.to_string(),
			periodic_task_name: request.periodic_task_name.clone(),
		},
		properties: Properties {
			correlation_id: id,
			reply_to: String::new(),
			delivery_mode: 2,
			delivery_info: DeliveryInfo {
				exchange,
				routing_key,
			},
			priority: request.routing.priority.unwrap_or(0),
			body_encoding: "base64",
			delivery_tag: Uuid::new_v4().to_string(),
		},
	};

	Ok((queue, envelope))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::DispatchError;
	use chrono::{TimeZone, Utc};

	fn decode_body(envelope: &Envelope) -> Value {
		let bytes = STANDARD.decode(&envelope.body).unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[test]
	fn test_defaults_to_configured_queue() {
		let req = DispatchRequest::new("app.tasks.add");
		let (queue, env) = build(&req, Uuid::new_v4(), "celery", "tempo@host").unwrap();
		assert_eq!(queue, "celery");
		assert_eq!(env.properties.delivery_info.routing_key, "celery");
		assert_eq!(env.properties.priority, 0);
		assert!(env.headers.expires.is_none());
	}

	#[test]
	fn test_body_carries_args_and_kwargs() {
		let mut req = DispatchRequest::new("app.tasks.add");
		req.args = vec![json!(2), json!(3)];
		req.kwargs.insert("round".to_string(), json!(true));

		let (_, env) = build(&req, Uuid::new_v4(), "celery", "o").unwrap();
		let body = decode_body(&env);
		assert_eq!(body[0], json!([2, 3]));
		assert_eq!(body[1], json!({"round": true}));
		assert_eq!(env.headers.argsrepr, "[2,3]");
	}

	#[test]
	fn test_routing_and_expiry_headers() {
		let mut req = DispatchRequest::new("app.tasks.report");
		req.routing.queue = Some("reports".to_string());
		req.routing.exchange = Some("direct".to_string());
		req.routing.priority = Some(7);
		req.expires = Some(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
		req.periodic_task_name = Some("nightly-report".to_string());

		let id = Uuid::new_v4();
		let (queue, env) = build(&req, id, "celery", "o").unwrap();
		assert_eq!(queue, "reports");
		assert_eq!(env.headers.id, id.to_string());
		assert_eq!(env.properties.correlation_id, id.to_string());
		assert_eq!(env.properties.delivery_info.exchange, "direct");
		assert_eq!(env.properties.priority, 7);
		assert_eq!(
			env.headers.expires.as_deref(),
			Some("2026-05-01T12:00:00.000000+00:00")
		);

		let json = serde_json::to_value(&env).unwrap();
		assert_eq!(json["headers"]["periodic_task_name"], "nightly-report");
		assert_eq!(json["content-type"], "application/json");
	}

	#[test]
	fn test_rejects_bad_priority() {
		let mut req = DispatchRequest::new("t");
		req.routing.priority = Some(11);
		assert!(matches!(
			build(&req, Uuid::new_v4(), "celery", "o"),
			Err(DispatchError::RoutingRejected(_))
		));
	}
}
