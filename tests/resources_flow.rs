// End-to-end flows against an in-process mock API.
// Run with: cargo test --test resources_flow

mod support;

use std::sync::Arc;
use std::time::Duration;

use animaforge_client::types::{
    Animation, AnimationQuery, AnimationStyle, CreateAnimation, Page, Resolution, UpdateAnimation, UpdateProfile, Upload,
};
use animaforge_client::validate::RegisterForm;
use animaforge_client::{
    ApiError, AppContext, AUTH_TOKEN_KEY, FetchPolicy, FileStorage, MemoryStorage, QueryKey, TokenStorage,
};
use support::{MockApi, VALID_TOKEN};

const CACHED: Duration = Duration::from_secs(60);
const GET: &str = "GET";

async fn logged_in(api: &MockApi, stale_time: Duration) -> (AppContext, Arc<MemoryStorage>) {
    let (context, storage) = api.context(api.config().with_stale_time(stale_time));
    context.resources().login("a@b.com", "secret123").await.unwrap();
    (context, storage)
}

// =============================================================================
// Auth scenarios
// =============================================================================

#[tokio::test]
async fn login_stores_session_and_sends_bearer() {
    let api = MockApi::start().await;
    let (context, storage) = api.context(api.config());

    let user = context.resources().login("a@b.com", "secret123").await.unwrap();

    assert_eq!(user.username, "a");
    assert_eq!(context.auth().user().unwrap().username, "a");
    assert_eq!(context.auth().token().as_deref(), Some(VALID_TOKEN));
    assert_eq!(storage.get(AUTH_TOKEN_KEY).as_deref(), Some(VALID_TOKEN));

    context.resources().animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.last_authorization().as_deref(), Some("Bearer t1"));
}

#[tokio::test]
async fn wrong_password_is_server_error_not_stale_credential() {
    let api = MockApi::start().await;
    let (context, storage) = api.context(api.config());

    let err = context.resources().login("a@b.com", "wrongpass").await.unwrap_err();

    assert_eq!(err, ApiError::ServerError { status: 401, message: Some("Invalid credentials".into()) });
    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(context.auth().token().is_none());
    assert!(storage.get(AUTH_TOKEN_KEY).is_none());
}

#[tokio::test]
async fn wrong_password_while_logged_in_keeps_session() {
    let api = MockApi::start().await;
    let (context, storage) = logged_in(&api, CACHED).await;
    context.resources().animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();

    let err = context.resources().login("a@b.com", "wrongpass").await.unwrap_err();

    assert_eq!(err, ApiError::ServerError { status: 401, message: Some("Invalid credentials".into()) });
    assert_eq!(api.last_authorization(), None);
    assert_eq!(context.auth().token().as_deref(), Some(VALID_TOKEN));
    assert_eq!(storage.get(AUTH_TOKEN_KEY).as_deref(), Some(VALID_TOKEN));
    let list = QueryKey::Animations(AnimationQuery::default());
    assert!(context.cache().get::<Page<Animation>>(&list).is_some());
}

#[tokio::test]
async fn register_logs_in() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config());
    let form = RegisterForm {
        username: "newbie".into(),
        email: "newbie@b.com".into(),
        password: "secret123".into(),
        confirm_password: "secret123".into(),
    };

    let user = context.resources().register(&form).await.unwrap();

    assert_eq!(user.username, "newbie");
    assert!(context.auth().is_authenticated());
    assert_eq!(api.count("POST", "/auth/register"), 1);
}

#[tokio::test]
async fn invalid_register_form_sends_nothing() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config());
    let form = RegisterForm {
        username: "newbie".into(),
        email: "newbie@b.com".into(),
        password: "secret123".into(),
        confirm_password: "secret999".into(),
    };

    assert!(matches!(context.resources().register(&form).await, Err(ApiError::ValidationFailure(_))));
    assert!(api.hits().is_empty());
}

#[tokio::test]
async fn rejected_token_on_start_clears_store_and_storage() {
    let api = MockApi::start().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(AUTH_TOKEN_KEY, "expired").unwrap();

    let context = AppContext::start(api.config(), storage.clone()).await.unwrap();

    assert_eq!(api.count(GET, "/auth/me"), 1);
    assert!(context.auth().user().is_none());
    assert!(context.auth().token().is_none());
    assert!(storage.get(AUTH_TOKEN_KEY).is_none());
}

#[tokio::test]
async fn valid_token_on_start_restores_user() {
    let api = MockApi::start().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(AUTH_TOKEN_KEY, VALID_TOKEN).unwrap();

    let context = AppContext::start(api.config(), storage).await.unwrap();

    assert!(context.auth().is_authenticated());
    assert_eq!(context.auth().user().unwrap().username, "a");
}

#[tokio::test]
async fn rejected_token_on_any_call_ends_session() {
    let api = MockApi::start().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(AUTH_TOKEN_KEY, "expired").unwrap();
    let context = AppContext::new(api.config(), storage.clone()).unwrap();

    let update = UpdateProfile { bio: Some("hello".into()), ..UpdateProfile::default() };
    let err = context.resources().update_profile(&update).await.unwrap_err();

    assert!(err.is_stale_credential());
    assert!(context.auth().token().is_none());
    assert!(storage.get(AUTH_TOKEN_KEY).is_none());
}

#[tokio::test]
async fn logout_notifies_server_then_clears() {
    let api = MockApi::start().await;
    let (context, storage) = logged_in(&api, CACHED).await;

    context.resources().logout().await.unwrap();

    assert_eq!(api.count("POST", "/auth/logout"), 1);
    assert_eq!(api.last_authorization().as_deref(), Some("Bearer t1"));
    assert!(context.auth().token().is_none());
    assert!(storage.get(AUTH_TOKEN_KEY).is_none());
    assert!(context.cache().keys().is_empty());

    context.resources().animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.last_authorization(), None);
}

#[tokio::test]
async fn session_survives_reload_from_file() {
    let api = MockApi::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    let first = AppContext::new(api.config(), Arc::new(FileStorage::new(&path))).unwrap();
    first.resources().login("a@b.com", "secret123").await.unwrap();

    let reloaded = AppContext::start(api.config(), Arc::new(FileStorage::new(&path))).await.unwrap();
    assert_eq!(reloaded.auth().token().as_deref(), Some(VALID_TOKEN));
    assert_eq!(reloaded.auth().user().unwrap().username, "a");

    reloaded.resources().logout().await.unwrap();
    let after_logout = AppContext::new(api.config(), Arc::new(FileStorage::new(&path))).unwrap();
    assert!(after_logout.auth().token().is_none());
}

// =============================================================================
// Query gating
// =============================================================================

#[tokio::test]
async fn empty_identifiers_never_hit_network() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config());
    let resources = context.resources();

    assert!(resources.animation("", FetchPolicy::CacheFirst).await.unwrap().is_none());
    assert!(resources.animation("  ", FetchPolicy::Refresh).await.unwrap().is_none());
    assert!(resources.user_profile("", FetchPolicy::CacheFirst).await.unwrap().is_none());
    assert!(resources.user_animations("", FetchPolicy::CacheFirst).await.unwrap().is_none());
    assert!(resources.current_user(FetchPolicy::CacheFirst).await.unwrap().is_none());

    assert!(api.hits().is_empty());
}

#[tokio::test]
async fn list_filters_become_query_string() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config());

    let query = AnimationQuery::category("Anime").with_page(2);
    let page = context.resources().animations(&query, FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(page.data.len(), 3);
    assert_eq!(api.hits()[0].query.as_deref(), Some("category=Anime&page=2"));
}

#[tokio::test]
async fn empty_search_shares_the_unfiltered_list() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config().with_stale_time(CACHED));
    let resources = context.resources();

    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animations(&AnimationQuery::search(""), FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 1);
    assert_eq!(context.cache().keys(), vec![QueryKey::Animations(AnimationQuery::default())]);
}

#[tokio::test]
async fn server_message_is_surfaced() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config());

    let err = context.resources().animation("missing", FetchPolicy::CacheFirst).await.unwrap_err();

    assert_eq!(err, ApiError::ServerError { status: 404, message: Some("Animation not found".into()) });
    assert_eq!(err.user_message(), "Animation not found");
}

#[tokio::test]
async fn cached_reads_skip_network_until_stale() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config().with_stale_time(CACHED));
    let resources = context.resources();

    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.count(GET, "/animations/1"), 1);

    resources.animation("1", FetchPolicy::Refresh).await.unwrap();
    assert_eq!(api.count(GET, "/animations/1"), 2);
}

// =============================================================================
// Like scenario (default zero stale time)
// =============================================================================

#[tokio::test]
async fn like_then_reread_list_fetches_list_once_more() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, Duration::ZERO).await;
    let resources = context.resources();
    let anime = AnimationQuery::category("Anime");

    let page = resources.animations(&anime, FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(page.data.len(), 3);
    assert_eq!(api.count(GET, "/animations"), 1);

    resources.like_animation("2").await.unwrap();
    resources.animations(&anime, FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 2);
    assert_eq!(api.count(GET, "/animations/2"), 0);
    assert_eq!(api.count("POST", "/animations/2/like"), 1);
}

// =============================================================================
// Invalidation table, one test per row (long stale time)
// =============================================================================

#[tokio::test]
async fn create_invalidates_lists_only() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let resources = context.resources();
    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animations(&AnimationQuery::category("Anime"), FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();

    let form = CreateAnimation::new("a fox in the snow", AnimationStyle::Anime, 5, Resolution::FullHd);
    let created = resources.create_animation(&form).await.unwrap();
    assert_eq!(created.id, "4");

    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animations(&AnimationQuery::category("Anime"), FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 4);
    assert_eq!(api.count(GET, "/animations/1"), 1);
}

#[tokio::test]
async fn like_invalidates_that_record_only() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let resources = context.resources();
    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("2", FetchPolicy::CacheFirst).await.unwrap();

    resources.like_animation("2").await.unwrap();
    assert_eq!(context.cache().freshness(&QueryKey::Animation("2".into())), Some(animaforge_client::Freshness::Stale));

    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("2", FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 1);
    assert_eq!(api.count(GET, "/animations/1"), 1);
    assert_eq!(api.count(GET, "/animations/2"), 2);
}

#[tokio::test]
async fn delete_invalidates_lists_only() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let resources = context.resources();
    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.user_animations("a", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("2", FetchPolicy::CacheFirst).await.unwrap();

    resources.delete_animation("2").await.unwrap();

    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.user_animations("a", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("2", FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 2);
    assert_eq!(api.count(GET, "/users/a/animations"), 2);
    assert_eq!(api.count(GET, "/animations/2"), 1);
    assert_eq!(api.count("DELETE", "/animations/2"), 1);
}

#[tokio::test]
async fn login_and_register_leave_cache_alone() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config().with_stale_time(CACHED));
    let resources = context.resources();
    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.user_profile("a", FetchPolicy::CacheFirst).await.unwrap();

    resources.login("a@b.com", "secret123").await.unwrap();
    let form = RegisterForm {
        username: "other".into(),
        email: "other@b.com".into(),
        password: "secret123".into(),
        confirm_password: "secret123".into(),
    };
    resources.register(&form).await.unwrap();

    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.user_profile("a", FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 1);
    assert_eq!(api.count(GET, "/users/a"), 1);
}

#[tokio::test]
async fn update_invalidates_record_and_lists() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let resources = context.resources();
    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("3", FetchPolicy::CacheFirst).await.unwrap();

    let update = UpdateAnimation { title: Some("Renamed".into()), ..UpdateAnimation::default() };
    let updated = resources.update_animation("1", &update).await.unwrap();
    assert_eq!(updated.title, "Renamed");

    resources.animations(&AnimationQuery::default(), FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("1", FetchPolicy::CacheFirst).await.unwrap();
    resources.animation("3", FetchPolicy::CacheFirst).await.unwrap();

    assert_eq!(api.count(GET, "/animations"), 2);
    assert_eq!(api.count(GET, "/animations/1"), 2);
    assert_eq!(api.count(GET, "/animations/3"), 1);
}

#[tokio::test]
async fn profile_update_invalidates_current_user() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let resources = context.resources();
    resources.current_user(FetchPolicy::CacheFirst).await.unwrap();
    resources.current_user(FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.count(GET, "/auth/me"), 1);

    let update = UpdateProfile { bio: Some("animator".into()), ..UpdateProfile::default() };
    let user = resources.update_profile(&update).await.unwrap();
    assert_eq!(user.bio.as_deref(), Some("animator"));
    assert_eq!(context.auth().user().unwrap().bio.as_deref(), Some("animator"));

    resources.current_user(FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.count(GET, "/auth/me"), 2);
}

// =============================================================================
// Multipart create / download
// =============================================================================

#[tokio::test]
async fn create_sends_multipart_fields_and_file() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;

    let mut form = CreateAnimation::new("a fox in the snow", AnimationStyle::ThreeD, 10, Resolution::UltraHd);
    form.title = Some("Snow Fox".into());
    form.tags = vec!["fox".into(), "winter".into()];
    form.file = Some(Upload { file_name: "ref.png".into(), mime: "image/png".into(), bytes: vec![1, 2, 3] });

    context.resources().create_animation(&form).await.unwrap();

    let upload = api.upload();
    let field = |name: &str| upload.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone());
    assert_eq!(field("prompt").as_deref(), Some("a fox in the snow"));
    assert_eq!(field("style").as_deref(), Some("3d"));
    assert_eq!(field("duration").as_deref(), Some("10"));
    assert_eq!(field("resolution").as_deref(), Some("4k"));
    assert_eq!(field("title").as_deref(), Some("Snow Fox"));
    assert_eq!(field("tags").as_deref(), Some("fox,winter"));
    assert_eq!(field("file").as_deref(), Some("ref.png"));
}

#[tokio::test]
async fn invalid_create_form_sends_nothing() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let before = api.hits().len();

    let form = CreateAnimation::new("a fox", AnimationStyle::Anime, 7, Resolution::Hd);
    assert!(matches!(context.resources().create_animation(&form).await, Err(ApiError::ValidationFailure(_))));
    assert_eq!(api.hits().len(), before);
}

#[tokio::test]
async fn download_returns_file_locator() {
    let api = MockApi::start().await;
    let (context, _) = api.context(api.config());

    let download = context.resources().download_animation("3").await.unwrap();

    assert_eq!(download.file_url, "https://cdn.test/v/3.mp4");
    assert_eq!(download.downloads, 3);
}

// =============================================================================
// Marketplace feeds
// =============================================================================

#[tokio::test]
async fn marketplace_feed_is_cached_and_refetched_after_create() {
    let api = MockApi::start().await;
    let (context, _) = logged_in(&api, CACHED).await;
    let resources = context.resources();

    let featured = resources.featured(0, FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(featured.data[0].likes, 12);
    assert_eq!(featured.total, 1);
    resources.featured(1, FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.count(GET, "/marketplace/featured"), 1);
    assert_eq!(api.hits().last().and_then(|hit| hit.query.clone()).as_deref(), Some("page=1"));

    let form = CreateAnimation::new("a fox in the snow", AnimationStyle::Anime, 5, Resolution::FullHd);
    resources.create_animation(&form).await.unwrap();
    resources.featured(1, FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.count(GET, "/marketplace/featured"), 2);

    resources.trending(1, FetchPolicy::CacheFirst).await.unwrap();
    assert_eq!(api.count(GET, "/marketplace/trending"), 1);
}
