//! Request/response surface shared by the CLI and the HTTP server.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::core::request::ReviewRequest;
use crate::pipeline::{EventSink, ReviewPipeline};

/// Status code and JSON body of a review response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "error": message.into() }),
        }
    }
}

/// Validate a raw request body and run a review for it.
///
/// 400 for a malformed request, 500 when the run itself blew up, 200 with
/// the `ReviewResult` otherwise (including runs that ended in FAILED).
pub async fn handle_review<S>(
    pipeline: Arc<ReviewPipeline>,
    body: Value,
    sink: S,
    cancel: CancellationToken,
) -> ApiResponse
where
    S: EventSink + Send + 'static,
{
    let request = match ReviewRequest::from_json(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "rejected review request");
            return ApiResponse::error(400, err.to_string());
        }
    };

    let run = tokio::spawn(async move {
        let mut sink = sink;
        pipeline.run(request, &mut sink, &cancel).await
    });
    match run.await {
        Ok(outcome) => match serde_json::to_value(&outcome.result) {
            Ok(body) => ApiResponse { status: 200, body },
            Err(err) => ApiResponse::error(500, err.to_string()),
        },
        Err(err) => {
            error!(error = %err, "review run aborted");
            ApiResponse::error(500, err.to_string())
        }
    }
}

/// OpenAPI description of `POST /agent`.
pub fn schema_document() -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Code Review Agent API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Automated code review agent that reviews pull requests"
        },
        "paths": {
            "/agent": {
                "post": {
                    "summary": "Review a pull request",
                    "description": "Analyze a pull request and provide comprehensive review feedback",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "required": ["pull_request_url"],
                                    "properties": {
                                        "pull_request_url": {
                                            "type": "string",
                                            "description": "Pull request URL",
                                            "example": "https://github.com/owner/repo/pull/123"
                                        },
                                        "review_criteria": {
                                            "type": "object",
                                            "description": "Review focus areas configuration",
                                            "properties": {
                                                "code_quality": {"type": "boolean", "default": true},
                                                "security": {"type": "boolean", "default": true},
                                                "performance": {"type": "boolean", "default": true},
                                                "style": {"type": "boolean", "default": true},
                                                "documentation": {"type": "boolean", "default": true}
                                            }
                                        },
                                        "severity_threshold": {
                                            "type": "string",
                                            "enum": ["low", "medium", "high", "critical"],
                                            "default": "low",
                                            "description": "Minimum severity level for reporting issues"
                                        },
                                        "post_comments": {
                                            "type": "boolean",
                                            "default": false,
                                            "description": "Whether to post comments to the PR"
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Review completed",
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/ReviewResult"}
                                }
                            }
                        },
                        "400": {
                            "description": "Missing or malformed pull_request_url",
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/Error"}
                                }
                            }
                        },
                        "500": {
                            "description": "Unexpected failure",
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/Error"}
                                }
                            }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "ReviewResult": {
                    "type": "object",
                    "properties": {
                        "review_summary": {"type": "string"},
                        "comments_added": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "file_path": {"type": "string"},
                                    "line_number": {"type": "integer"},
                                    "comment": {"type": "string"},
                                    "severity": {"type": "string"},
                                    "category": {"type": "string"}
                                }
                            }
                        },
                        "issues_found": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "category": {"type": "string"},
                                    "severity": {"type": "string"},
                                    "description": {"type": "string"},
                                    "file_path": {"type": "string"},
                                    "line_number": {"type": "integer"},
                                    "suggestion": {"type": "string"}
                                }
                            }
                        },
                        "approval_recommendation": {
                            "type": "string",
                            "enum": ["approve", "request_changes", "comment"]
                        },
                        "success": {"type": "boolean"},
                        "error": {"type": "string"}
                    }
                },
                "Error": {
                    "type": "object",
                    "properties": {
                        "success": {"type": "boolean"},
                        "error": {"type": "string"}
                    }
                }
            }
        }
    })
}
