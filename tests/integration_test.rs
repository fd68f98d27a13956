use selector_sql::fragment::Fragment;
use selector_sql::prelude::*;
use serde_json::{json, Value};

fn posts() -> Table {
    Table::new(
        "Posts",
        vec![
            ("userId", SqlType::Text, true),
            ("title", SqlType::Text, false),
            ("url", SqlType::Text, true),
            ("postedAt", SqlType::Timestamp, true),
            ("baseScore", SqlType::Integer, true),
            ("draft", SqlType::Boolean, true),
            ("status", SqlType::Integer, true),
            ("tagIds", SqlType::Array(Box::new(SqlType::Text)), true),
            ("coauthorStatuses", SqlType::JsonArray, true),
            ("contents", SqlType::Json, true),
        ],
    )
    .unwrap()
    .with_indexed_path("contents.wordCount", SqlType::Integer)
    .unwrap()
}

fn test_collection() -> Table {
    Table::new(
        "TestCollection",
        vec![("a", SqlType::Integer, true), ("b", SqlType::Text, true)],
    )
    .unwrap()
}

fn views(table: &Table) -> ViewRegistry {
    let mut registry = ViewRegistry::new();

    registry
        .register_default_view(table, |_, context| {
            let mut selector = json!({"status": 2, "draft": false});
            // admins also see drafts
            if context.is_admin {
                selector = json!({"status": 2});
            }
            Ok(ViewQuery::new(selector)
                .with_options(QueryOptions::new().with_sort(Sort::new().desc("postedAt"))))
        })
        .unwrap();

    registry
        .register_view(table, "userPosts", |terms, _| {
            let user_id = terms.get_str("userId").ok_or_else(|| {
                QueryError::InvalidOptions("userPosts needs a userId term".to_string())
            })?;
            Ok(ViewQuery::new(json!({"userId": user_id}))
                .with_options(QueryOptions::new().with_sort(Sort::new().desc("baseScore"))))
        })
        .unwrap();

    registry
        .register_view(table, "tagged", |terms, _| {
            let tags = terms.get("tagIds").cloned().unwrap_or(Value::Array(Vec::new()));
            Ok(ViewQuery::new(json!({"tagIds": {"$in": tags}})))
        })
        .unwrap();

    registry
}

#[test]
fn test_delete_without_selector_is_refused() {
    let table = test_collection();
    for selector in [json!({}), Value::Null] {
        let err = DeleteBuilder::new(&table)
            .selector(Selector::from_value(&selector).unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsafeMutation { .. }));
        assert_eq!(
            err.to_string(),
            "Refusing to delete every row of TestCollection; set noSafetyHarness to allow it"
        );
    }
}

#[test]
fn test_delete_with_harness_disabled() {
    let table = test_collection();
    let options = QueryOptions::from_value(&json!({"noSafetyHarness": true})).unwrap();
    let query = DeleteBuilder::new(&table)
        .selector(Selector::empty())
        .options(options)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(query.sql, "DELETE FROM \"TestCollection\"");
    assert_eq!(query.args, Vec::<Value>::new());
}

#[test]
fn test_delete_with_selector() {
    let table = test_collection();
    let query = DeleteBuilder::new(&table)
        .selector(Selector::from_value(&json!({"a": 3, "b": "test"})).unwrap())
        .build()
        .unwrap();

    assert_eq!(
        query.sql,
        "DELETE FROM \"TestCollection\" WHERE ( \"a\" = $1 AND \"b\" = $2 )"
    );
    assert_eq!(query.args, vec![json!(3), json!("test")]);
}

#[test]
fn test_bounded_delete() {
    let table = test_collection();
    let options = QueryOptions::from_value(&json!({"limit": 1})).unwrap();
    let query = DeleteBuilder::new(&table)
        .selector(Selector::from_value(&json!({"a": 3})).unwrap())
        .options(options)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(
        query.sql,
        "DELETE FROM \"TestCollection\" WHERE \"_id\" IN (SELECT \"_id\" FROM \"TestCollection\" WHERE \"a\" = $1 LIMIT $2)"
    );
    assert_eq!(query.args, vec![json!(3), json!(1)]);
}

#[test]
fn test_string_selector_is_id_shorthand() {
    let table = posts();
    let shorthand = SelectBuilder::new(&table)
        .selector(Selector::from_value(&json!("abc123")).unwrap())
        .build()
        .unwrap();
    let explicit = SelectBuilder::new(&table)
        .selector(Selector::from_value(&json!({"_id": "abc123"})).unwrap())
        .build()
        .unwrap();

    assert_eq!(shorthand, explicit);
    assert_eq!(shorthand.sql, "SELECT * FROM \"Posts\" WHERE \"_id\" = $1");
}

#[test]
fn test_placeholders_are_contiguous() {
    let table = posts();
    let selector = Selector::from_value(&json!({
        "$or": [
            {"baseScore": {"$gte": 10, "$lte": 100}},
            {"tagIds": {"$all": ["a", "b"]}, "coauthorStatuses.userId": "u1"}
        ],
        "postedAt": {"$gt": "2024-01-01T00:00:00Z"},
        "contents.wordCount": {"$in": [1, 2, 3]}
    }))
    .unwrap();
    let query = SelectBuilder::new(&table)
        .selector(selector)
        .limit(10)
        .offset(5)
        .build()
        .unwrap();

    for n in 1..=query.args.len() {
        assert!(query.sql.contains(&format!("${}", n)), "missing ${} in {}", n, query.sql);
    }
    assert!(!query.sql.contains(&format!("${}", query.args.len() + 1)));
}

#[test]
fn test_unknown_field_names_collection() {
    let table = posts();
    let err = SelectBuilder::new(&table)
        .selector(Selector::from_value(&json!({"author.name": "x"})).unwrap())
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown field \"author.name\" in collection Posts");
}

#[test]
fn test_unsupported_operator() {
    let err = Selector::from_value(&json!({"title": {"$where": "1"}})).unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnsupportedOperator { ref operator, ref field } if operator == "$where" && field == "title"
    ));
}

#[test]
fn test_default_view_select() {
    let table = posts();
    let registry = views(&table);
    let planner = QueryPlanner::new(&registry, PlannerConfig::default());

    let query = planner
        .build_select(
            &table,
            QueryTarget::View(None),
            &ViewTerms::new().with("limit", json!(20)),
            &ViewContext::anonymous(),
            QueryOptions::new(),
        )
        .unwrap();

    assert_eq!(
        query.sql,
        "SELECT * FROM \"Posts\" WHERE ( \"status\" = $1 AND \"draft\" = $2 ) ORDER BY \"postedAt\" DESC LIMIT $3"
    );
    assert_eq!(query.args, vec![json!(2), json!(false), json!(20)]);
}

#[test]
fn test_admin_context_changes_view() {
    let table = posts();
    let registry = views(&table);
    let planner = QueryPlanner::new(&registry, PlannerConfig::default());

    let query = planner
        .build_count(
            &table,
            QueryTarget::View(None),
            &ViewTerms::new(),
            &ViewContext::user("admin1").admin(),
        )
        .unwrap();

    assert_eq!(query.sql, "SELECT COUNT(*) FROM \"Posts\" WHERE \"status\" = $1");
}

#[test]
fn test_named_view_with_terms() {
    let table = posts();
    let registry = views(&table);
    let planner = QueryPlanner::new(&registry, PlannerConfig::default());
    let terms = ViewTerms::from_value(&json!({"userId": "u1", "limit": 5000})).unwrap();

    let query = planner
        .build_select(
            &table,
            QueryTarget::View(Some("userPosts")),
            &terms,
            &ViewContext::anonymous(),
            QueryOptions::new(),
        )
        .unwrap();

    assert_eq!(
        query.sql,
        "SELECT * FROM \"Posts\" WHERE ( \"status\" = $1 AND \"draft\" = $2 AND \"userId\" = $3 ) ORDER BY \"baseScore\" DESC LIMIT $4"
    );
    assert_eq!(
        query.args,
        vec![json!(2), json!(false), json!("u1"), json!(1000)]
    );
}

#[test]
fn test_view_terms_bind_as_parameters() {
    let table = posts();
    let registry = views(&table);
    let planner = QueryPlanner::new(&registry, PlannerConfig::default());
    let terms = ViewTerms::new().with("tagIds", json!(["a'; DROP TABLE \"Posts\"; --"]));

    let query = planner
        .build_select(
            &table,
            QueryTarget::View(Some("tagged")),
            &terms,
            &ViewContext::anonymous(),
            QueryOptions::new(),
        )
        .unwrap();

    assert!(!query.sql.contains("DROP"));
    assert!(query.sql.contains("\"tagIds\" && $3::TEXT[]"));
    assert_eq!(query.args[2], json!(["a'; DROP TABLE \"Posts\"; --"]));
}

#[test]
fn test_unknown_view() {
    let table = posts();
    let registry = views(&table);
    let planner = QueryPlanner::new(&registry, PlannerConfig::default());

    let err = planner
        .build_select(
            &table,
            QueryTarget::View(Some("frontpage")),
            &ViewTerms::new(),
            &ViewContext::anonymous(),
            QueryOptions::new(),
        )
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownView { ref view, .. } if view == "frontpage"));
}

#[test]
fn test_fragment_projection_select() {
    let table = posts();
    let fragment = Fragment::parse(
        r#"
        fragment PostsList on Post {
          title
          url
          # resolver-only
          user { displayName }
          contents { wordCount }
          commentCount
        }
        "#,
    )
    .unwrap();

    let query = SelectBuilder::new(&table)
        .project(fragment.projection(&table).unwrap())
        .where_eq("draft", json!(false))
        .build()
        .unwrap();

    assert_eq!(
        query.sql,
        "SELECT \"_id\", \"title\", \"url\", \"contents\" FROM \"Posts\" WHERE \"draft\" = $1"
    );
}

#[test]
fn test_update_and_insert_share_parameter_rules() {
    let table = posts();
    let insert = InsertBuilder::new(&table)
        .document(json!({
            "_id": "p1",
            "title": "Hello",
            "postedAt": "2024-03-01T12:00:00Z",
            "tagIds": ["a"],
            "contents": {"wordCount": 3}
        }))
        .build()
        .unwrap();
    assert_eq!(
        insert.sql,
        "INSERT INTO \"Posts\" (\"_id\", \"title\", \"postedAt\", \"tagIds\", \"contents\") VALUES ( $1, $2, $3::TIMESTAMP, $4::TEXT[], $5::jsonb )"
    );

    let update = UpdateBuilder::new(&table)
        .selector(Selector::by_id("p1"))
        .modifier(&json!({"$set": {"postedAt": "2024-03-02T00:00:00Z", "contents.wordCount": 4}}))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        update.sql,
        "UPDATE \"Posts\" SET \"postedAt\" = $1::TIMESTAMP, \"contents\" = jsonb_set( COALESCE( \"contents\", '{}'::jsonb ), $2::text[], $3::jsonb, TRUE ) WHERE \"_id\" = $4"
    );
    assert_eq!(update.args[1], json!(["wordCount"]));
}
