use std::time::{SystemTime, UNIX_EPOCH};

use rankguard_application::{NewAttribute, NewPermission, PermissionStore};
use rankguard_core::AppError;
use rankguard_domain::{AttributeType, AttributeValue, JobGradeList, RoleId, StringList};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresPermissionStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres permission store tests: {error}");
    }

    Some(pool)
}

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("t{nanos}")
}

async fn insert_role(pool: &PgPool, job: &str, grade: i32) -> i64 {
    let inserted = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO rbac_roles (job, grade)
            VALUES ($1, $2)
            RETURNING id
            "#,
    )
    .bind(job)
    .bind(grade)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(id) => id,
        Err(error) => panic!("failed to insert role: {error}"),
    }
}

#[tokio::test]
async fn created_rows_are_listed_with_decoded_values() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresPermissionStore::new(pool.clone());
    let suffix = unique_suffix();
    let job = format!("job{suffix}");

    let permission = match store
        .create_permission(NewPermission {
            category: format!("citizens{suffix}"),
            name: "ListCitizens".to_owned(),
            order: 3,
        })
        .await
    {
        Ok(permission) => permission,
        Err(error) => panic!("failed to create permission: {error}"),
    };
    let attribute = match store
        .create_attribute(NewAttribute {
            permission_id: permission.id(),
            key: "Access".to_owned(),
            attribute_type: AttributeType::JobGradeList,
            valid_values: Some(AttributeValue::JobGradeList(JobGradeList::with_ceilings([
                (job.as_str(), 4),
            ]))),
        })
        .await
    {
        Ok(attribute) => attribute,
        Err(error) => panic!("failed to create attribute: {error}"),
    };

    let role_id = insert_role(&pool, job.as_str(), 2).await;
    let granted = sqlx::query(
        r#"
            INSERT INTO rbac_role_permissions (role_id, permission_id, granted)
            VALUES ($1, $2, TRUE)
            "#,
    )
    .bind(role_id)
    .bind(i64::try_from(permission.id().as_u64()).unwrap_or_default())
    .execute(&pool)
    .await;
    assert!(granted.is_ok());

    let value = sqlx::query(
        r#"
            INSERT INTO rbac_role_attributes (role_id, attribute_id, attr_value)
            VALUES ($1, $2, NULL)
            "#,
    )
    .bind(role_id)
    .bind(i64::try_from(attribute.id().as_u64()).unwrap_or_default())
    .execute(&pool)
    .await;
    assert!(value.is_ok());

    let role_id = RoleId::new(u64::try_from(role_id).unwrap_or_default());
    let roles = store.list_roles(Some(job.as_str())).await;
    let grants = store.list_role_grants(Some(role_id)).await;
    let values = store.list_role_attribute_values(Some(role_id)).await;
    let found = store.find_role(role_id).await;

    assert_eq!(roles.map(|roles| roles.len()).ok(), Some(1));
    assert_eq!(
        grants.map(|grants| grants.iter().map(|grant| grant.value).collect::<Vec<_>>()).ok(),
        Some(vec![true])
    );
    assert_eq!(
        values.map(|values| values.into_iter().map(|value| value.value).collect::<Vec<_>>()).ok(),
        Some(vec![None])
    );
    assert_eq!(found.ok().flatten().map(|role| role.grade), Some(2));

    let attributes = store.list_attributes().await;
    let listed = attributes
        .ok()
        .and_then(|attributes| attributes.into_iter().find(|listed| listed.id() == attribute.id()));
    assert_eq!(listed, Some(attribute));
}

#[tokio::test]
async fn duplicate_permission_is_a_conflict() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresPermissionStore::new(pool);
    let input = NewPermission {
        category: format!("documents{}", unique_suffix()),
        name: "ViewDocument".to_owned(),
        order: 0,
    };

    assert!(store.create_permission(input.clone()).await.is_ok());
    let duplicate = store.create_permission(input).await;

    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn attribute_definition_update_replaces_type_and_values() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresPermissionStore::new(pool);
    let permission = match store
        .create_permission(NewPermission {
            category: format!("jobs{}", unique_suffix()),
            name: "ListColleagues".to_owned(),
            order: 0,
        })
        .await
    {
        Ok(permission) => permission,
        Err(error) => panic!("failed to create permission: {error}"),
    };
    let attribute = match store
        .create_attribute(NewAttribute {
            permission_id: permission.id(),
            key: "Types".to_owned(),
            attribute_type: AttributeType::StringList,
            valid_values: None,
        })
        .await
    {
        Ok(attribute) => attribute,
        Err(error) => panic!("failed to create attribute: {error}"),
    };
    let types = AttributeValue::StringList(StringList::new(["Own", "All"]));

    let updated = store
        .update_attribute_definition(attribute.id(), AttributeType::StringList, Some(types.clone()))
        .await;
    assert!(updated.is_ok());

    let listed = store.list_attributes().await.ok().and_then(|attributes| {
        attributes
            .into_iter()
            .find(|listed| listed.id() == attribute.id())
    });
    assert_eq!(listed.map(|listed| listed.valid_values().clone()), Some(types));
}
