//! GraphQL schema
//!
//! Queries and mutations over models, methods and the other lookups.
//! Every resolver reads the [`ModelService`] and the caller's
//! [`Identity`](mdl_common::auth::Identity) from the request data.

mod inputs;
mod mutation;
mod query;
mod types;

use async_graphql::{EmptySubscription, Schema};
use mdl_common::services::ModelService;

pub use mutation::MutationRoot;
pub use query::QueryRoot;

pub type MdlSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Nesting beyond this is rejected before execution
const MAX_DEPTH: usize = 12;
const MAX_COMPLEXITY: usize = 1000;

pub fn build_schema(service: ModelService) -> MdlSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(service)
        .limit_depth(MAX_DEPTH)
        .limit_complexity(MAX_COMPLEXITY)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Request;
    use mdl_common::auth::Identity;
    use mdl_common::db::models::Role;
    use mdl_common::naming::NamedInput;
    use mdl_common::services::UploadRequest;
    use mdl_common::storage::MemoryStore;
    use mdl_common::{AppConfig, DbPool, Repository};
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn setup() -> (MdlSchema, ModelService) {
        let repo = Repository::new(DbPool::sqlite_memory().await.unwrap());
        let store = Arc::new(MemoryStore::new("mdl"));
        let service = ModelService::new(repo, store, &AppConfig::default()).unwrap();
        (build_schema(service.clone()), service)
    }

    async fn signed_in(service: &ModelService, name: &str) -> Identity {
        let user = service
            .repo()
            .create_user(name, None, Role::User)
            .await
            .unwrap();
        Identity::user(user.id, Role::User)
    }

    async fn upload(service: &ModelService, identity: &Identity, keywords: &str) -> i32 {
        let mut req = UploadRequest::new("cgcnn.pth.tar", b"weights".to_vec());
        req.keywords = Some(keywords.to_string());
        req.method = Some(NamedInput::new("CGCNN"));
        service.upload_model(identity, req).await.unwrap().id
    }

    async fn run(schema: &MdlSchema, identity: Identity, query: &str) -> Value {
        let response = schema.execute(Request::new(query).data(identity)).await;
        serde_json::to_value(&response).unwrap()
    }

    fn error_code(response: &Value) -> &str {
        response["errors"][0]["extensions"]["code"]
            .as_str()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_anonymous_cannot_create_method() {
        let (schema, _service) = setup().await;

        let response = run(
            &schema,
            Identity::anonymous(),
            r#"mutation { createOneMethod(data: { name: "SchNet" }) { id } }"#,
        )
        .await;

        assert_eq!(error_code(&response), "UNAUTHORIZED");
        assert_eq!(response["errors"][0]["extensions"]["status"], json!(401));
    }

    #[tokio::test]
    async fn test_method_lookup_by_name_is_normalised() {
        let (schema, service) = setup().await;
        let alice = signed_in(&service, "alice").await;
        upload(&service, &alice, "oqmd").await;

        let response = run(
            &schema,
            Identity::anonymous(),
            r#"{ method(where: { name: "cgcnn" }) { name modelCounts owner { name } models { keywords } } }"#,
        )
        .await;

        assert_eq!(
            response["data"]["method"],
            json!({
                "name": "cgcnn",
                "modelCounts": 1,
                "owner": { "name": "alice" },
                "models": [{ "keywords": "oqmd" }],
            })
        );
    }

    #[tokio::test]
    async fn test_get_model_urls_keeps_caller_order() {
        let (schema, service) = setup().await;
        let alice = signed_in(&service, "alice").await;
        let a = upload(&service, &alice, "a").await;
        let b = upload(&service, &alice, "b").await;

        let query = format!("{{ getModelUrls(ids: [{b}, {a}]) {{ id }} }}");
        let response = run(&schema, Identity::anonymous(), &query).await;
        assert_eq!(
            response["data"]["getModelUrls"],
            json!([{ "id": b }, { "id": a }])
        );

        let query = format!(
            "{{ getModelUrls(ids: [{b}, {a}], orderBy: [{{ id: asc }}]) {{ id }} }}"
        );
        let response = run(&schema, Identity::anonymous(), &query).await;
        assert_eq!(
            response["data"]["getModelUrls"],
            json!([{ "id": a }, { "id": b }])
        );

        let query = format!("{{ model(id: {a}) {{ downloads artifact {{ filename }} }} }}");
        let response = run(&schema, Identity::anonymous(), &query).await;
        assert_eq!(
            response["data"]["model"],
            json!({ "downloads": 2, "artifact": { "filename": "cgcnn.pth.tar" } })
        );
    }

    #[tokio::test]
    async fn test_update_rejects_other_owner() {
        let (schema, service) = setup().await;
        let alice = signed_in(&service, "alice").await;
        let bob = signed_in(&service, "bob").await;
        let id = upload(&service, &alice, "mine").await;

        let query = format!(
            r#"mutation {{ updateOneModel(where: {{ id: {id} }}, data: {{ deprecated: true }}) {{ deprecated }} }}"#
        );
        let response = run(&schema, bob, &query).await;
        assert_eq!(error_code(&response), "FORBIDDEN");

        let response = run(&schema, alice, &query).await;
        assert_eq!(
            response["data"]["updateOneModel"],
            json!({ "deprecated": true })
        );
    }

    #[tokio::test]
    async fn test_delete_many_returns_count() {
        let (schema, service) = setup().await;
        let alice = signed_in(&service, "alice").await;
        upload(&service, &alice, "x").await;
        upload(&service, &alice, "y").await;

        let response = run(
            &schema,
            alice,
            r#"mutation { deleteManyModel(where: { method: "CGCNN" }) { count } }"#,
        )
        .await;
        assert_eq!(response["data"]["deleteManyModel"], json!({ "count": 2 }));

        let response = run(&schema, Identity::anonymous(), "{ modelsCount }").await;
        assert_eq!(response["data"]["modelsCount"], json!(0));
    }

    #[tokio::test]
    async fn test_missing_method_is_reported() {
        let (schema, service) = setup().await;
        let alice = signed_in(&service, "alice").await;

        let response = run(
            &schema,
            alice,
            r#"mutation { deleteOneMethod(where: { id: 42 }) { id } }"#,
        )
        .await;
        assert_eq!(error_code(&response), "METHOD_NOT_FOUND");
    }
}
