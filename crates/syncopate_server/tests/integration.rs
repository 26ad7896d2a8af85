//! End-to-end scenarios through the request handlers.

use serde_json::json;
use syncopate_core::QueryOptions;
use syncopate_server::{
    CreateEntityRequest, ListParams, Server, ServerConfig, UpdateEntityRequest,
};

fn server() -> Server {
    Server::new(ServerConfig::default()).unwrap()
}

fn register(server: &Server, def: serde_json::Value) {
    server
        .create_entity_type(serde_json::from_value(def).unwrap())
        .unwrap();
}

fn register_user(server: &Server) {
    register(
        server,
        json!({
            "name": "user",
            "idGenerator": "auto_increment",
            "fields": [
                {"name": "email", "type": "string", "unique": true, "required": true},
                {"name": "age", "type": "integer", "indexed": true, "nullable": true}
            ]
        }),
    );
}

fn create(server: &Server, entity_type: &str, body: serde_json::Value) -> syncopate_server::ApiResult<serde_json::Value> {
    let request: CreateEntityRequest = serde_json::from_value(body).unwrap();
    server
        .create_entity(entity_type, &request)
        .map(|r| serde_json::to_value(r).unwrap())
}

#[test]
fn auto_increment_uniqueness_and_indexed_query() {
    let server = server();
    register_user(&server);

    let created = create(&server, "user", json!({"fields": {"email": "a@b", "age": 30}})).unwrap();
    assert_eq!(created["id"], json!(1));

    let err = create(&server, "user", json!({"fields": {"email": "a@b", "age": 31}})).unwrap_err();
    assert_eq!(err.status, 409);
    assert_eq!(err.db_code.as_str(), "SY300");

    let created = create(&server, "user", json!({"fields": {"email": "c@d", "age": 30}})).unwrap();
    assert_eq!(created["id"], json!(2));

    let opts: QueryOptions = serde_json::from_value(json!({
        "entityType": "user",
        "filters": [{"field": "age", "op": "eq", "value": 30}]
    }))
    .unwrap();
    let response = server.query(&opts).unwrap();
    assert_eq!(response.total, 2);

    let ids: Vec<&serde_json::Value> = response.data.iter().map(|row| &row["id"]).collect();
    assert_eq!(ids, vec![&json!(1), &json!(2)]);
}

#[test]
fn uuid_ids_are_normalized_to_lowercase() {
    let server = server();
    register(
        &server,
        json!({
            "name": "post",
            "idGenerator": "uuid",
            "fields": [{"name": "title", "type": "string"}]
        }),
    );

    let created = create(
        &server,
        "post",
        json!({
            "id": "550E8400-E29B-41D4-A716-446655440000",
            "fields": {"title": "hi"}
        }),
    )
    .unwrap();
    assert_eq!(created["id"], json!("550e8400-e29b-41d4-a716-446655440000"));

    let entity = server
        .get_entity("post", "550E8400-E29B-41D4-A716-446655440000")
        .unwrap();
    assert_eq!(entity["id"], json!("550e8400-e29b-41d4-a716-446655440000"));
}

#[test]
fn cuid_rejects_ids_without_prefix() {
    let server = server();
    register(
        &server,
        json!({
            "name": "note",
            "idGenerator": "cuid",
            "fields": [{"name": "body", "type": "string"}]
        }),
    );

    let err = create(&server, "note", json!({"id": "xyz", "fields": {"body": "x"}})).unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.db_code.as_str(), "SY201");

    let created = create(&server, "note", json!({"fields": {"body": "x"}})).unwrap();
    assert!(created["id"].as_str().unwrap().starts_with('c'));
}

#[test]
fn custom_generator_requires_an_id() {
    let server = server();
    register(
        &server,
        json!({
            "name": "order",
            "idGenerator": "custom",
            "fields": [{"name": "total", "type": "float"}]
        }),
    );

    let err = create(&server, "order", json!({"fields": {"total": 9.5}})).unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.db_code.as_str(), "SY200");

    let created = create(
        &server,
        "order",
        json!({"id": "ord-001", "fields": {"total": 9.5}}),
    )
    .unwrap();
    assert_eq!(created["id"], json!("ord-001"));
}

#[test]
fn adding_unique_constraint_over_duplicates_is_rejected() {
    let server = server();
    register_user(&server);
    create(&server, "user", json!({"fields": {"email": "a@b", "age": 30}})).unwrap();
    create(&server, "user", json!({"fields": {"email": "c@d", "age": 30}})).unwrap();

    let update = json!({
        "name": "user",
        "fields": [
            {"name": "email", "type": "string", "unique": true, "required": true},
            {"name": "age", "type": "integer", "indexed": true, "nullable": true, "unique": true}
        ]
    });
    let err = server
        .update_entity_type("user", serde_json::from_value(update).unwrap())
        .unwrap_err();
    assert_eq!(err.status, 409);

    // Schema unchanged.
    let def = server.get_entity_type("user").unwrap();
    assert!(!def.field("age").unwrap().unique);
}

#[test]
fn id_generator_is_immutable() {
    let server = server();
    register_user(&server);

    let update = json!({
        "name": "user",
        "idGenerator": "uuid",
        "fields": [
            {"name": "email", "type": "string", "unique": true, "required": true}
        ]
    });
    let err = server
        .update_entity_type("user", serde_json::from_value(update).unwrap())
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.db_code.as_str(), "SY301");
}

#[test]
fn schema_update_reports_unique_diffs() {
    let server = server();
    register_user(&server);

    let update = json!({
        "name": "user",
        "fields": [
            {"name": "email", "type": "string", "required": true},
            {"name": "age", "type": "integer", "indexed": true, "nullable": true, "unique": true}
        ]
    });
    let response = server
        .update_entity_type("user", serde_json::from_value(update).unwrap())
        .unwrap();
    assert_eq!(response.unique_constraints_added, Some(vec!["age".to_string()]));
    assert_eq!(
        response.unique_constraints_removed,
        Some(vec!["email".to_string()])
    );
}

#[test]
fn join_query_attaches_posts_without_mutating_users() {
    let server = server();
    register_user(&server);
    register(
        &server,
        json!({
            "name": "post",
            "fields": [
                {"name": "title", "type": "string"},
                {"name": "authorId", "type": "integer", "indexed": true}
            ]
        }),
    );

    create(&server, "user", json!({"fields": {"email": "a@b"}})).unwrap();
    create(&server, "post", json!({"fields": {"title": "one", "authorId": 1}})).unwrap();
    create(&server, "post", json!({"fields": {"title": "two", "authorId": 1}})).unwrap();

    let opts: QueryOptions = serde_json::from_value(json!({
        "entityType": "user",
        "joins": [{
            "entityType": "post",
            "localField": "id",
            "foreignField": "authorId",
            "as": "posts",
            "type": "one_to_many"
        }]
    }))
    .unwrap();

    let response = server.join_query(&opts).unwrap();
    let posts = response.data[0]["fields"]["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["title"], json!("one"));

    // Re-fetching the user shows no trace of the join.
    let user = server.get_entity("user", "1").unwrap();
    assert!(user["fields"].get("posts").is_none());
}

#[test]
fn join_query_without_joins_is_rejected() {
    let server = server();
    register_user(&server);

    let opts: QueryOptions =
        serde_json::from_value(json!({"entityType": "user"})).unwrap();
    let err = server.join_query(&opts).unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.db_code.as_str(), "SY204");
}

#[test]
fn representation_hides_internals_and_null_fills() {
    let server = server();
    register_user(&server);
    create(&server, "user", json!({"fields": {"email": "a@b"}})).unwrap();

    let entity = server.get_entity("user", "1").unwrap();
    let fields = entity["fields"].as_object().unwrap();
    assert_eq!(fields["email"], json!("a@b"));
    assert_eq!(fields["age"], serde_json::Value::Null);
    assert!(!fields.contains_key("_created_at"));
}

#[test]
fn debug_mode_exposes_internal_fields() {
    let server = Server::new(ServerConfig::default().debug(true)).unwrap();
    register_user(&server);
    create(&server, "user", json!({"fields": {"email": "a@b"}})).unwrap();

    let entity = server.get_entity("user", "1").unwrap();
    let fields = entity["fields"].as_object().unwrap();
    assert!(fields.contains_key("_created_at"));
    assert!(fields.contains_key("_updated_at"));
}

#[test]
fn list_entities_paginates() {
    let server = server();
    register_user(&server);
    for i in 0..5 {
        create(
            &server,
            "user",
            json!({"fields": {"email": format!("u{i}@db"), "age": 20 + i}}),
        )
        .unwrap();
    }

    let params = ListParams::from_pairs([("limit", "2"), ("offset", "2")]);
    let response = server.list_entities("user", &params).unwrap();
    assert_eq!(response.total, 5);
    assert_eq!(response.count, 2);
    assert!(response.has_more);
    assert_eq!(response.data[0]["id"], json!(3));

    let params = ListParams::from_pairs([("orderBy", "age"), ("orderDesc", "true"), ("limit", "1")]);
    let response = server.list_entities("user", &params).unwrap();
    assert_eq!(response.data[0]["fields"]["age"], json!(24));
}

#[test]
fn count_query_envelope() {
    let server = server();
    register_user(&server);
    create(&server, "user", json!({"fields": {"email": "a@b", "age": 30}})).unwrap();
    create(&server, "user", json!({"fields": {"email": "c@d", "age": 31}})).unwrap();

    let opts: QueryOptions = serde_json::from_value(json!({
        "entityType": "user",
        "filters": [{"field": "age", "op": "gte", "value": 30}]
    }))
    .unwrap();
    let response = server.count_query(&opts).unwrap();
    assert_eq!(response.count, 2);
    assert_eq!(response.query_type, "simple");
    assert_eq!(response.filters_count, 1);
    assert_eq!(response.joins_applied, 0);
    assert!(!response.execution_time.is_empty());
}

#[test]
fn update_and_delete_roundtrip() {
    let server = server();
    register_user(&server);
    create(&server, "user", json!({"fields": {"email": "a@b", "age": 30}})).unwrap();

    let request: UpdateEntityRequest =
        serde_json::from_value(json!({"fields": {"age": 31}})).unwrap();
    let updated = server.update_entity("user", "1", &request).unwrap();
    assert_eq!(updated.id, json!(1));

    let entity = server.get_entity("user", "1").unwrap();
    assert_eq!(entity["fields"]["age"], json!(31));
    assert_eq!(entity["fields"]["email"], json!("a@b"));

    let deleted = server.delete_entity("user", "1").unwrap();
    assert_eq!(deleted.id, json!(1));

    let err = server.get_entity("user", "1").unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.db_code.as_str(), "SY100");
}

#[test]
fn invalid_ids_are_bad_requests() {
    let server = server();
    register_user(&server);

    let err = server.get_entity("user", "not-a-number").unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.db_code.as_str(), "SY201");
}

#[test]
fn unknown_type_surfaces_as_404() {
    let server = server();
    let err = server.get_entity_type("ghost").unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.db_code.as_str(), "SY101");
}

#[test]
fn wal_backed_server_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let wal_path = dir.path().join("syncopate.wal");

    {
        let server = Server::new(ServerConfig::default().wal_path(&wal_path)).unwrap();
        register_user(&server);
        create(&server, "user", json!({"fields": {"email": "a@b", "age": 30}})).unwrap();
    }

    let server = Server::new(ServerConfig::default().wal_path(&wal_path)).unwrap();
    register_user(&server);

    let entity = server.get_entity("user", "1").unwrap();
    assert_eq!(entity["fields"]["email"], json!("a@b"));

    // The counter survives: the next insert does not reuse id 1.
    let created = create(&server, "user", json!({"fields": {"email": "c@d"}})).unwrap();
    assert_eq!(created["id"], json!(2));
}

#[test]
fn debug_schema_surface() {
    let server = server();
    register_user(&server);
    create(&server, "user", json!({"fields": {"email": "a@b"}})).unwrap();

    let all = server.debug_schema(None).unwrap();
    assert!(all["entity_types"]["user"].is_object());

    let user = server.debug_schema(Some("user")).unwrap();
    assert_eq!(user["id_generator"], json!("auto_increment"));
    assert_eq!(user["entity_count"], json!(1));
    assert_eq!(user["fields"]["email"]["unique"], json!(true));

    let err = server.debug_schema(Some("ghost")).unwrap_err();
    assert_eq!(err.status, 404);
}
