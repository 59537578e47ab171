//! GraphQL endpoint and playground

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use mdl_common::auth::Identity;
use mdl_common::metrics::RequestMetrics;
use tracing::debug;

use crate::AppState;

/// Execute a query or mutation as the authenticated caller
pub async fn graphql(
    State(state): State<AppState>,
    identity: Identity,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let request = request.into_inner();
    let operation = request
        .operation_name
        .clone()
        .unwrap_or_else(|| "anonymous".to_string());

    debug!(
        operation = %operation,
        request_id = %identity.request_id(),
        "Executing GraphQL request"
    );

    let metrics = RequestMetrics::start(&operation);
    let response = state.schema.execute(request.data(identity)).await;
    metrics.finish(response.is_ok());

    response.into()
}

/// GraphiQL, served outside production only
pub async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
