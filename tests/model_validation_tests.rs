use chrono::{TimeZone, Utc};
use conduit_api::models::{
    ArticleRecord, ArticleView, CommentRecord, CommentView, CreateArticle, CreateArticleRequest,
    Profile, UpdateArticleRequest, User, iso_timestamp,
};
use serde_json::json;

fn record() -> ArticleRecord {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    ArticleRecord {
        id: 1,
        slug: "hello-world".into(),
        title: "Hello World".into(),
        description: "desc".into(),
        body: "body".into(),
        author_id: 7,
        author_username: "jake".into(),
        author_bio: Some("bio".into()),
        author_image: None,
        tag_list: vec!["greeting".into()],
        created_at: at,
        updated_at: at,
    }
}

#[test]
fn article_view_serialises_camel_case_with_body() {
    let view = ArticleView::new(record(), true, true, 3);
    let value = serde_json::to_value(&view).unwrap();

    assert_eq!(
        value,
        json!({
            "slug": "hello-world",
            "title": "Hello World",
            "description": "desc",
            "body": "body",
            "tagList": ["greeting"],
            "createdAt": "2024-05-01T10:00:00.000Z",
            "updatedAt": "2024-05-01T10:00:00.000Z",
            "favorited": true,
            "favoritesCount": 3,
            "author": { "username": "jake", "bio": "bio", "image": null, "following": false }
        })
    );
}

#[test]
fn list_views_leave_out_the_body() {
    let value = serde_json::to_value(ArticleView::new(record(), false, false, 0)).unwrap();
    assert!(value.get("body").is_none());
}

#[test]
fn comment_view_shape() {
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let view = CommentView::from(CommentRecord {
        id: 9,
        body: "hi".into(),
        article_id: 1,
        author_id: 2,
        author_username: "anna".into(),
        author_bio: None,
        author_image: Some("img.png".into()),
        created_at: at,
        updated_at: at,
    });
    assert_eq!(
        serde_json::to_value(view).unwrap(),
        json!({
            "id": 9,
            "createdAt": "2024-01-02T03:04:05.000Z",
            "updatedAt": "2024-01-02T03:04:05.000Z",
            "body": "hi",
            "author": { "username": "anna", "bio": null, "image": "img.png", "following": false }
        })
    );
}

#[test]
fn profile_from_user_never_follows() {
    let user = User {
        id: 1,
        username: "jake".into(),
        email: "jake@jake.jake".into(),
        password_hash: "hash".into(),
        bio: None,
        image: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    assert_eq!(
        Profile::from(&user),
        Profile {
            username: "jake".into(),
            bio: None,
            image: None,
            following: false,
        }
    );
}

#[test]
fn create_article_accepts_camel_case_tag_list() {
    let parsed: CreateArticleRequest = serde_json::from_value(json!({
        "article": { "title": "t", "description": "d", "body": "b", "tagList": ["x"] }
    }))
    .unwrap();
    assert_eq!(parsed.article.tag_list, Some(vec!["x".to_string()]));

    let without_tags: CreateArticle =
        serde_json::from_value(json!({ "title": "t", "description": "d", "body": "b" })).unwrap();
    assert!(without_tags.tag_list.is_none());
}

#[test]
fn update_article_fields_are_all_optional() {
    let parsed: UpdateArticleRequest =
        serde_json::from_value(json!({ "article": { "body": "new" } })).unwrap();
    assert_eq!(parsed.article.body.as_deref(), Some("new"));
    assert!(parsed.article.title.is_none());
    assert!(parsed.article.tag_list.is_none());
}

#[test]
fn timestamps_keep_millisecond_precision() {
    let at = Utc.timestamp_millis_opt(1_714_557_600_123).unwrap();
    assert_eq!(iso_timestamp(&at), "2024-05-01T10:00:00.123Z");
}
