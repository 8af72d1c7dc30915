//! Authorization verdicts and their Envoy rendering

use envoy_types::ext_authz::v3::pb::CheckResponse;
use envoy_types::ext_authz::v3::CheckResponseExt;
use envoy_types::pb::envoy::config::core::v3::header_value_option::HeaderAppendAction;
use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use envoy_types::pb::envoy::r#type::v3::HttpStatus;
use envoy_types::pb::envoy::service::auth::v3::{
    check_response, DeniedHttpResponse, OkHttpResponse,
};
use envoy_types::pb::google::protobuf::BoolValue;
use tonic::Status;

use super::types::HeaderMutation;

/// Outcome of one pipeline evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Request allowed; the proxy applies `headers` to the upstream request
    Allow { headers: Vec<HeaderMutation> },
    /// Request denied
    Deny {
        /// HTTP status returned to the client
        status: u16,
        /// Body returned to the client
        body: String,
        /// Internal reason, logged but never sent to the client
        cause: Option<String>,
    },
    /// Non-OK verdict of the upstream service, returned unchanged
    PassThrough(CheckResponse),
    /// No verdict could be reached because the upstream was unavailable
    Error { cause: String },
}

/// Denial rendering shared by [`Decision::Deny`] and [`Decision::Error`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyTemplate {
    pub status: u16,
    pub body: String,
}

impl Decision {
    /// Create an Allow decision
    pub fn allow(headers: Vec<HeaderMutation>) -> Self {
        Decision::Allow { headers }
    }

    /// Create a Deny decision from the template, recording why
    pub fn deny(template: &DenyTemplate, cause: Option<String>) -> Self {
        Decision::Deny {
            status: template.status,
            body: template.body.clone(),
            cause,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow { .. } => "allow",
            Decision::Deny { .. } => "deny",
            Decision::PassThrough(_) => "upstream",
            Decision::Error { .. } => "error",
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Render the decision as an Envoy check response.
    ///
    /// `Error` is rendered as a denial so the proxy never lets a request
    /// through on an internal failure.
    pub fn into_check_response(self, template: &DenyTemplate) -> CheckResponse {
        match self {
            Decision::Allow { headers } => {
                let mut response = CheckResponse::with_status(Status::ok("authorized"));
                response.http_response = Some(check_response::HttpResponse::OkResponse(
                    OkHttpResponse {
                        headers: headers.iter().map(header_value_option).collect(),
                        ..Default::default()
                    },
                ));
                response
            }
            Decision::Deny { status, body, .. } => {
                denied(Status::permission_denied("denied"), status, body)
            }
            Decision::PassThrough(response) => response,
            Decision::Error { .. } => denied(
                Status::unavailable("authorization unavailable"),
                template.status,
                template.body.clone(),
            ),
        }
    }
}

fn denied(rpc_status: Status, http_status: u16, body: String) -> CheckResponse {
    let mut response = CheckResponse::with_status(rpc_status);
    response.http_response = Some(check_response::HttpResponse::DeniedResponse(
        DeniedHttpResponse {
            status: Some(HttpStatus {
                code: i32::from(http_status),
            }),
            body,
            ..Default::default()
        },
    ));
    response
}

#[allow(deprecated)]
fn header_value_option(mutation: &HeaderMutation) -> HeaderValueOption {
    let append_action = if mutation.append {
        HeaderAppendAction::AppendIfExistsOrAdd
    } else {
        HeaderAppendAction::OverwriteIfExistsOrAdd
    };
    HeaderValueOption {
        header: Some(HeaderValue {
            key: mutation.key.clone(),
            value: mutation.value.clone(),
            ..Default::default()
        }),
        append: Some(BoolValue {
            value: mutation.append,
        }),
        append_action: append_action as i32,
        ..Default::default()
    }
}
