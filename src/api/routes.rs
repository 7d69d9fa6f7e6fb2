//! Maps HTTP requests onto [`AdminConfigRepository`] operations.

use serde_json::Value;
use tracing::{error, info};

use super::helpers::{err_response, error_response, no_content, ok_empty, ok_json};
use super::parsing::{query_param, request_body, request_method, request_path};
use crate::core::models::AdminConfig;
use crate::errors::AdminConfigError;
use crate::repository::AdminConfigRepository;

/// Base path of the admin configuration resource, lower-cased.
pub const BASE_PATH: &str = "/api/adminconfiguration";

const CONFIG_NAME_PARAM: &str = "configName";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    List,
    GetByName,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Collection,
    GetByName,
    DeleteByName,
}

fn resource_for(path: &str) -> Option<Resource> {
    // Paths may carry an API Gateway stage prefix, so match on the suffix.
    if path.ends_with(BASE_PATH) {
        Some(Resource::Collection)
    } else if path.ends_with(&format!("{BASE_PATH}/getbyname")) {
        Some(Resource::GetByName)
    } else if path.ends_with(&format!("{BASE_PATH}/deleteadminconfig")) {
        Some(Resource::DeleteByName)
    } else {
        None
    }
}

/// Resolves the route for an HTTP method and normalized path.
///
/// # Errors
///
/// Returns a ready-made 404 or 405 response when nothing matches.
pub fn resolve(method: &str, path: &str) -> Result<Route, Value> {
    let Some(resource) = resource_for(path) else {
        return Err(err_response(404, "Not found"));
    };

    match (resource, method) {
        (Resource::Collection, "GET") => Ok(Route::List),
        (Resource::Collection, "POST") => Ok(Route::Create),
        (Resource::Collection, "PUT") => Ok(Route::Update),
        (Resource::GetByName, "GET") => Ok(Route::GetByName),
        (Resource::DeleteByName, "DELETE") => Ok(Route::Delete),
        _ => Err(err_response(405, "Method not allowed")),
    }
}

fn config_name(payload: &Value) -> Result<String, AdminConfigError> {
    query_param(payload, CONFIG_NAME_PARAM)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            AdminConfigError::InvalidRequest(format!("Missing {CONFIG_NAME_PARAM} parameter"))
        })
}

fn config_body(payload: &Value) -> Result<AdminConfig, AdminConfigError> {
    let body = request_body(payload)?;
    serde_json::from_str(&body)
        .map_err(|e| AdminConfigError::InvalidRequest(format!("Invalid configuration body: {e}")))
}

async fn dispatch(
    repo: &dyn AdminConfigRepository,
    route: Route,
    payload: &Value,
) -> Result<Value, AdminConfigError> {
    match route {
        Route::List => Ok(ok_json(&repo.get_all().await?)),
        Route::GetByName => {
            let name = config_name(payload)?;
            Ok(match repo.get(&name).await? {
                Some(config) => ok_json(&config),
                None => no_content(),
            })
        }
        Route::Create => {
            let config = config_body(payload)?;
            Ok(ok_json(&repo.insert(config).await?))
        }
        // The public update endpoint creates the configuration if it is missing.
        Route::Update => {
            let config = config_body(payload)?;
            Ok(ok_json(&repo.upsert(config).await?))
        }
        Route::Delete => {
            let name = config_name(payload)?;
            repo.delete(&name).await?;
            Ok(ok_empty())
        }
    }
}

/// Handles one API Gateway proxy request and always produces a proxy response.
pub async fn route_request(repo: &dyn AdminConfigRepository, payload: &Value) -> Value {
    let (Some(method), Some(path)) = (request_method(payload), request_path(payload)) else {
        error!("Request missing method or path");
        return err_response(400, "Missing method or path");
    };

    let route = match resolve(&method, &path) {
        Ok(route) => route,
        Err(response) => {
            info!(method = %method, path = %path, "No route for request");
            return response;
        }
    };
    info!(method = %method, path = %path, route = ?route, "Routing admin configuration request");

    match dispatch(repo, route, payload).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}
