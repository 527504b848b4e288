//! Repository behaviour over the in-memory store.

use super::*;
use crate::domain::ports::{KeyValueStoreError, MockKeyValueStore};
use crate::domain::{Book, BookRating, Category, Role, User};
use crate::outbound::persistence::InMemoryStore;
use crate::test_support::MutableClock;
use rstest::{fixture, rstest};

const TTL: Duration = Duration::from_secs(60);

struct Fixture {
    store: Arc<InMemoryStore>,
    clock: Arc<MutableClock>,
    context: StoreContext,
}

#[fixture]
fn fixture() -> Fixture {
    let clock = Arc::new(MutableClock::at_fixed_instant());
    let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
    let cache = QueryCache::new(store.clone(), clock.clone(), "cache:").expect("valid namespace");
    Fixture {
        context: StoreContext::new(store.clone(), cache, TTL),
        store,
        clock,
    }
}

fn id(raw: &str) -> RecordId {
    RecordId::new(raw).expect("valid id")
}

fn user(name: &str, email: &str) -> User {
    User::new(name, email, "{noop}secret")
}

async fn seed_books(books: &Repository<Book>, count: usize) {
    for n in 0..count {
        books
            .save(Book::new(format!("Book {n}")).with_id(id(&format!("isbn-{n:02}"))))
            .await
            .expect("book saved");
    }
}

#[rstest]
#[tokio::test]
async fn save_assigns_identifier_and_round_trips(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let saved = users
        .save(user("Ada Lovelace", "ada@example.com").with_password_confirm("{noop}secret"))
        .await
        .expect("save succeeds");
    let user_id = saved.id().expect("identifier assigned").clone();

    let loaded = users.find_by_id(&user_id).await.expect("user found");
    assert_eq!(loaded.email(), "ada@example.com");
    assert_eq!(loaded.password(), Some("{noop}secret"));
    assert_eq!(users.count().await, Ok(1));
    assert_eq!(users.exists(&user_id).await, Ok(true));
}

#[rstest]
#[tokio::test]
async fn invalid_records_are_not_written(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let err = users
        .save(user("Ada Lovelace", "not-an-email"))
        .await
        .expect_err("validation fails");
    assert_eq!(err.code(), ErrorCode::InvalidRecord);
    assert_eq!(users.count().await, Ok(0));
}

#[rstest]
#[tokio::test]
async fn missing_record_is_not_found_and_not_cached(fixture: Fixture) {
    let roles = fixture.context.repository::<Role>();
    let err = roles.find_by_id(&id("admin")).await.expect_err("absent");
    assert_eq!(err.code(), ErrorCode::NotFound);

    roles
        .save(Role::new("admin").with_id(id("admin")))
        .await
        .expect("save succeeds");
    assert_eq!(roles.find_by_id(&id("admin")).await.map(|role| role.name().to_owned()), Ok("admin".to_owned()));
}

#[rstest]
#[case(0, 10)]
#[case(1, 10)]
#[case(2, 5)]
#[case(3, 0)]
#[tokio::test]
async fn pages_slice_identifiers_in_order(
    fixture: Fixture,
    #[case] page: usize,
    #[case] expected: usize,
) {
    let books = fixture.context.repository::<Book>();
    seed_books(&books, 25).await;

    let result = books.find_page(page, 10).await.expect("page loads");
    assert_eq!(result.content().len(), expected);
    assert_eq!(result.total_pages(), 3);
    assert_eq!(result.total_elements(), 25);
    if let Some(first) = result.content().first() {
        assert_eq!(first.id(), Some(&id(&format!("isbn-{:02}", page * 10))));
    }
}

#[rstest]
#[tokio::test]
async fn zero_page_size_is_rejected(fixture: Fixture) {
    let books = fixture.context.repository::<Book>();
    let err = books.find_page(0, 0).await.expect_err("size rejected");
    assert_eq!(err.code(), ErrorCode::InvalidPageRequest);
}

#[rstest]
#[tokio::test]
async fn large_page_sizes_return_the_whole_collection(fixture: Fixture) {
    let books = fixture.context.repository::<Book>();
    seed_books(&books, 25).await;

    let page = books.find_page(0, 1001).await.expect("large sizes are valid");
    assert_eq!(page.content().len(), 25);
    assert_eq!(page.total_pages(), 1);
    assert_eq!(page.total_elements(), 25);
}

#[rstest]
#[tokio::test]
async fn save_invalidates_cached_pages(fixture: Fixture) {
    let books = fixture.context.repository::<Book>();
    seed_books(&books, 3).await;
    assert_eq!(books.find_page(0, 10).await.map(|page| page.total_elements()), Ok(3));

    books
        .save(Book::new("Late arrival").with_id(id("isbn-99")))
        .await
        .expect("book saved");
    let page = books.find_page(0, 10).await.expect("page loads");
    assert_eq!(page.total_elements(), 4);
    assert!(page.content().iter().any(|book| book.title() == "Late arrival"));
}

#[rstest]
#[tokio::test]
async fn collection_members_without_records_are_skipped(fixture: Fixture) {
    let categories = fixture.context.repository::<Category>();
    categories
        .save(Category::new("Fiction").with_id(id("fiction")))
        .await
        .expect("saved");
    assert_eq!(categories.find_all().await.map(|all| all.len()), Ok(1));

    // Written behind the repository's back, so nothing invalidates.
    fixture
        .store
        .set_add("Category", "ghost")
        .await
        .expect("raw write");
    assert_eq!(categories.find_all().await.map(|all| all.len()), Ok(1));

    fixture.clock.advance(TTL);
    assert_eq!(categories.find_all().await.map(|all| all.len()), Ok(1));
}

#[rstest]
#[tokio::test]
async fn find_all_is_ordered_by_identifier(fixture: Fixture) {
    let categories = fixture.context.repository::<Category>();
    for name in ["travel", "art", "fiction"] {
        categories
            .save(Category::new(name).with_id(id(name)))
            .await
            .expect("saved");
    }
    let names: Vec<_> = categories
        .find_all()
        .await
        .expect("loads")
        .iter()
        .map(|category| category.name().to_owned())
        .collect();
    assert_eq!(names, vec!["art", "fiction", "travel"]);
}

#[rstest]
#[tokio::test]
async fn index_follows_updates(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let saved = users
        .save(user("Ada Lovelace", "ada@example.com"))
        .await
        .expect("saved");
    let user_id = saved.id().expect("id").clone();
    assert_eq!(users.find_by_index(User::EMAIL, "ada@example.com").await.map(|found| found.len()), Ok(1));

    users
        .save(user("Ada Lovelace", "countess@example.com").with_id(user_id.clone()))
        .await
        .expect("updated");

    assert_eq!(users.find_by_index(User::EMAIL, "ada@example.com").await, Ok(Vec::new()));
    let found = users
        .find_first_by_index(User::EMAIL, "countess@example.com")
        .await
        .expect("query succeeds")
        .expect("user indexed under new email");
    assert_eq!(found.id(), Some(&user_id));
}

#[rstest]
#[tokio::test]
async fn unindexed_field_is_an_invalid_query(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let err = users
        .find_by_index(User::NAME, "Ada Lovelace")
        .await
        .expect_err("name is not indexed");
    assert_eq!(err.code(), ErrorCode::InvalidQuery);
}

#[rstest]
#[tokio::test]
async fn stale_index_members_are_skipped(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let saved = users
        .save(user("Ada Lovelace", "ada@example.com"))
        .await
        .expect("saved");
    let user_id = saved.id().expect("id").clone();
    for member in [user_id.as_ref(), "vanished"] {
        fixture
            .store
            .set_add("User:idx:email:other@example.com", member)
            .await
            .expect("raw write");
    }

    assert_eq!(users.find_by_index(User::EMAIL, "other@example.com").await, Ok(Vec::new()));
}

#[rstest]
#[tokio::test]
async fn ratings_are_listed_per_book(fixture: Fixture) {
    let ratings = fixture.context.repository::<BookRating>();
    ratings
        .save_all([
            BookRating::new(id("u1"), id("b1"), 5).with_id(id("r1")),
            BookRating::new(id("u2"), id("b1"), 3).with_id(id("r2")),
            BookRating::new(id("u1"), id("b2"), 4).with_id(id("r3")),
        ])
        .await
        .expect("saved");

    let scores: Vec<_> = ratings
        .find_by_index(BookRating::BOOK, "b1")
        .await
        .expect("query succeeds")
        .iter()
        .map(BookRating::rating)
        .collect();
    assert_eq!(scores, vec![5, 3]);
}

#[rstest]
#[tokio::test]
async fn delete_removes_record_and_index_entries(fixture: Fixture) {
    let roles = fixture.context.repository::<Role>();
    roles
        .save(Role::new("admin").with_id(id("admin")))
        .await
        .expect("saved");
    assert_eq!(roles.find_first_by_index(Role::NAME, "admin").await.map(|role| role.is_some()), Ok(true));

    assert_eq!(roles.delete(&id("admin")).await, Ok(true));
    assert_eq!(roles.delete(&id("admin")).await, Ok(false));
    assert_eq!(roles.find_first_by_index(Role::NAME, "admin").await, Ok(None));
    assert_eq!(roles.count().await, Ok(0));
    let err = roles.find_by_id(&id("admin")).await.expect_err("gone");
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(fixture.store.exists("Role:admin:idx").await, Ok(false));
}

#[rstest]
#[tokio::test]
async fn attach_is_idempotent_and_visible_through_point_lookups(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let saved = users
        .save(user("Ada Lovelace", "ada@example.com"))
        .await
        .expect("saved");
    let user_id = saved.id().expect("id").clone();
    users.find_by_id(&user_id).await.expect("warm the cache");

    for _ in 0..2 {
        users
            .attach(&user_id, User::ROLES, &id("admin"))
            .await
            .expect("attach succeeds");
    }

    assert_eq!(users.resolve(&user_id, User::ROLES).await, Ok(BTreeSet::from([id("admin")])));
    let loaded = users.find_by_id(&user_id).await.expect("user found");
    assert_eq!(loaded.roles(), &BTreeSet::from([id("admin")]));

    assert_eq!(users.detach(&user_id, User::ROLES, &id("admin")).await, Ok(true));
    assert_eq!(users.resolve(&user_id, User::ROLES).await, Ok(BTreeSet::new()));
}

#[rstest]
#[tokio::test]
async fn attach_rejects_unknown_fields_and_parents(fixture: Fixture) {
    let users = fixture.context.repository::<User>();
    let unknown_field = users
        .attach(&id("u1"), User::EMAIL, &id("admin"))
        .await
        .expect_err("email is not a reference");
    assert_eq!(unknown_field.code(), ErrorCode::InvalidQuery);

    let missing_parent = users
        .attach(&id("ghost"), User::ROLES, &id("admin"))
        .await
        .expect_err("parent does not exist");
    assert_eq!(missing_parent.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn deleted_role_leaves_dangling_reference(fixture: Fixture) {
    let roles = fixture.context.repository::<Role>();
    let users = fixture.context.repository::<User>();
    roles
        .save_all([
            Role::new("admin").with_id(id("admin")),
            Role::new("customer").with_id(id("customer")),
        ])
        .await
        .expect("roles saved");
    let mut ada = user("Ada Lovelace", "ada@example.com");
    ada.add_role(id("admin"));
    ada.add_role(id("customer"));
    let user_id = users.save(ada).await.expect("saved").id().expect("id").clone();

    roles.delete(&id("admin")).await.expect("role deleted");

    let loaded = users.find_by_id(&user_id).await.expect("user still loads");
    assert!(loaded.roles().contains(&id("admin")));
    let resolved = users
        .resolve_records::<Role>(&user_id, User::ROLES)
        .await
        .expect("resolution succeeds");
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved.first(), Some(&ResolvedReference::Dangling(id("admin"))));
    assert!(matches!(resolved.get(1), Some(ResolvedReference::Found(role)) if role.name() == "customer"));
}

#[rstest]
#[tokio::test]
async fn resolving_into_the_wrong_type_is_rejected(fixture: Fixture) {
    let books = fixture.context.repository::<Book>();
    books
        .save(Book::new("Dune").with_id(id("dune")).with_category(id("scifi")))
        .await
        .expect("saved");
    let err = books
        .resolve_records::<Role>(&id("dune"), Book::CATEGORIES)
        .await
        .expect_err("categories are not roles");
    assert_eq!(err.code(), ErrorCode::InvalidQuery);
}

#[rstest]
#[tokio::test]
async fn store_outage_surfaces_as_unavailable() {
    let mut store = MockKeyValueStore::new();
    store.expect_get().returning(|_| Ok(None));
    store
        .expect_hash_get_all()
        .returning(|_| Err(KeyValueStoreError::unavailable("operation timed out after 2s")));
    let store: Arc<dyn KeyValueStore> = Arc::new(store);
    let cache = QueryCache::new(Arc::clone(&store), Arc::new(MutableClock::at_fixed_instant()), "cache:")
        .expect("valid namespace");
    let books = StoreContext::new(store, cache, TTL).repository::<Book>();

    let err = books.find_by_id(&id("dune")).await.expect_err("store is down");
    assert_eq!(err.code(), ErrorCode::StoreUnavailable);
    assert!(err.is_retryable());
}
