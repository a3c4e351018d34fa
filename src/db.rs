use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqliteConnection, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{entity} '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }

    fn from_insert(err: sqlx::Error, entity: &'static str, key: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate {
                    entity,
                    key: key.into(),
                }
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Fixed-width RFC 3339 so that text ordering in SQL matches time ordering.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub last_fetched_at: Option<String>,
}

/// A feed joined with the name of the user who added it.
#[derive(Debug, Clone, FromRow)]
pub struct FeedWithOwner {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub feed_url: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Option<String>,
    pub feed_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub feed_id: i64,
    pub title: &'a str,
    pub url: &'a str,
    pub description: &'a str,
    pub published_at: Option<DateTime<Utc>>,
}

const FEED_FOLLOW_SELECT: &str = r#"
    SELECT ff.id, users.name AS user_name, feeds.name AS feed_name, feeds.url AS feed_url
    FROM feed_follows ff
    JOIN users ON users.id = ff.user_id
    JOIN feeds ON feeds.id = ff.feed_id
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_fetched_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_follows (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, feed_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                published_at TEXT,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched
            ON feeds(last_fetched_at, id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_feed_published
            ON posts(feed_id, published_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Users

    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let now = format_timestamp(Utc::now());
        let id = sqlx::query("INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(&now)
            .bind(&now)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::from_insert(e, "user", name))?
            .last_insert_rowid();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    /// Deletes every user; feeds, follows and posts go with them.
    pub async fn reset_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // Feeds

    pub async fn create_feed(&self, user_id: i64, name: &str, url: &str) -> Result<Feed, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_feed(&mut conn, user_id, name, url).await
    }

    /// Adds a feed and follows it for its owner. Either both rows are written
    /// or neither is.
    pub async fn create_feed_with_follow(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<(Feed, FeedFollow), StoreError> {
        let mut tx = self.pool.begin().await?;
        let feed = insert_feed(&mut tx, user_id, name, url).await?;
        let follow = insert_feed_follow(&mut tx, user_id, feed.id).await?;
        tx.commit().await?;
        Ok((feed, follow))
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT feeds.id, feeds.name, feeds.url, users.name AS user_name
            FROM feeds
            JOIN users ON users.id = feeds.user_id
            ORDER BY feeds.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// The feed polled longest ago. Never-fetched feeds come first, ties go to
    /// the lowest id.
    pub async fn next_feed_to_fetch(&self) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            r#"
            SELECT * FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<Feed, StoreError> {
        self.mark_feed_fetched_at(feed_id, Utc::now()).await
    }

    pub async fn mark_feed_fetched_at(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Feed, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let at = format_timestamp(at);
        let result = sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
            .bind(&at)
            .bind(&at)
            .bind(feed_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(feed)
    }

    // Follows

    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_feed_follow(&mut conn, user_id, feed_id).await
    }

    pub async fn feed_follows_for_user(&self, user_id: i64) -> Result<Vec<FeedFollow>, StoreError> {
        let follows = sqlx::query_as::<_, FeedFollow>(&format!(
            "{FEED_FOLLOW_SELECT} WHERE ff.user_id = ? ORDER BY ff.id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // Posts

    /// Inserts a post. A URL that is already stored yields `Duplicate`; the
    /// unique constraint is the only dedup check, so racing writers are safe.
    pub async fn create_post(&self, post: &NewPost<'_>) -> Result<Post, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let now = format_timestamp(Utc::now());
        let id = sqlx::query(
            r#"
            INSERT INTO posts (title, url, description, published_at, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.title)
        .bind(post.url)
        .bind(post.description)
        .bind(post.published_at.map(format_timestamp))
        .bind(post.feed_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::from_insert(e, "post", post.url))?
        .last_insert_rowid();

        let created = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(created)
    }

    /// Newest posts across every feed the user follows.
    pub async fn posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT posts.* FROM posts
            JOIN feed_follows ff ON ff.feed_id = posts.feed_id
            WHERE ff.user_id = ?
            ORDER BY posts.published_at DESC NULLS LAST, posts.id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE feed_id = ? ORDER BY id")
            .bind(feed_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    pub async fn count_posts(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

// Inserts run to completion with `execute` and the row is read back on the
// same connection, so callers never observe a half-committed write.

async fn insert_feed(
    conn: &mut SqliteConnection,
    user_id: i64,
    name: &str,
    url: &str,
) -> Result<Feed, StoreError> {
    let now = format_timestamp(Utc::now());
    let id = sqlx::query(
        r#"
        INSERT INTO feeds (name, url, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(url)
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::from_insert(e, "feed", url))?
    .last_insert_rowid();

    let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(feed)
}

async fn insert_feed_follow(
    conn: &mut SqliteConnection,
    user_id: i64,
    feed_id: i64,
) -> Result<FeedFollow, StoreError> {
    let now = format_timestamp(Utc::now());
    let id = sqlx::query(
        r#"
        INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(feed_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::from_insert(e, "feed follow", feed_id.to_string()))?
    .last_insert_rowid();

    let follow = sqlx::query_as::<_, FeedFollow>(&format!("{FEED_FOLLOW_SELECT} WHERE ff.id = ?"))
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(follow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    async fn create_owner(db: &Database) -> User {
        db.create_user("owner").await.unwrap()
    }

    fn new_post(feed_id: i64, title: &'static str, url: &'static str) -> NewPost<'static> {
        NewPost {
            feed_id,
            title,
            url,
            description: "",
            published_at: None,
        }
    }

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_database_initialization() {
            let db = create_test_db().await;
            assert!(db.list_users().await.unwrap().is_empty());
            assert_eq!(db.count_posts().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let db = create_test_db().await;
            assert!(db.initialize().await.is_ok());
        }
    }

    mod user_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_and_get_user() {
            let db = create_test_db().await;
            let created = db.create_user("kahya").await.unwrap();
            let fetched = db.get_user_by_name("kahya").await.unwrap();
            assert_eq!(created.id, fetched.id);
        }

        #[tokio::test]
        async fn test_duplicate_user_name() {
            let db = create_test_db().await;
            db.create_user("kahya").await.unwrap();
            let err = db.create_user("kahya").await.unwrap_err();
            assert!(err.is_duplicate());
        }

        #[tokio::test]
        async fn test_missing_user() {
            let db = create_test_db().await;
            let err = db.get_user_by_name("nobody").await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound));
        }

        #[tokio::test]
        async fn test_reset_cascades() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let feed = db
                .create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();
            db.create_feed_follow(user.id, feed.id).await.unwrap();
            db.create_post(&new_post(feed.id, "A", "https://blog.example.com/a"))
                .await
                .unwrap();

            assert_eq!(db.reset_users().await.unwrap(), 1);

            assert!(db.list_users().await.unwrap().is_empty());
            assert!(db.list_feeds_with_owner().await.unwrap().is_empty());
            assert_eq!(db.count_posts().await.unwrap(), 0);
        }
    }

    mod feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_feed_url_is_unique() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            db.create_feed(user.id, "One", "https://example.com/rss")
                .await
                .unwrap();
            let err = db
                .create_feed(user.id, "Two", "https://example.com/rss")
                .await
                .unwrap_err();
            assert!(err.is_duplicate());
        }

        #[tokio::test]
        async fn test_create_feed_with_follow() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;

            let (feed, follow) = db
                .create_feed_with_follow(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();
            assert_eq!(follow.feed_name, "Blog");
            assert_eq!(follow.feed_url, feed.url);
            assert_eq!(follow.user_name, "owner");
            assert_eq!(db.feed_follows_for_user(user.id).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_create_feed_with_follow_rolls_back_on_duplicate() {
            let db = create_test_db().await;
            let owner = create_owner(&db).await;
            let other = db.create_user("other").await.unwrap();
            db.create_feed_with_follow(owner.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();

            let err = db
                .create_feed_with_follow(other.id, "Copy", "https://blog.example.com/rss")
                .await
                .unwrap_err();
            assert!(err.is_duplicate());

            assert_eq!(db.list_feeds_with_owner().await.unwrap().len(), 1);
            assert!(db.feed_follows_for_user(other.id).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_list_feeds_with_owner() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            db.create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();

            let feeds = db.list_feeds_with_owner().await.unwrap();
            assert_eq!(feeds.len(), 1);
            assert_eq!(feeds[0].user_name, "owner");
            assert_eq!(feeds[0].url, "https://blog.example.com/rss");
        }

        #[tokio::test]
        async fn test_get_feed_by_url() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let feed = db
                .create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();

            let found = db.get_feed_by_url("https://blog.example.com/rss").await.unwrap();
            assert_eq!(found.id, feed.id);
            assert!(matches!(
                db.get_feed_by_url("https://missing.example.com").await,
                Err(StoreError::NotFound)
            ));
        }
    }

    mod fetch_order_tests {
        use super::*;

        #[tokio::test]
        async fn test_no_feeds() {
            let db = create_test_db().await;
            let err = db.next_feed_to_fetch().await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound));
        }

        #[tokio::test]
        async fn test_never_fetched_then_oldest_first() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let now = Utc::now();

            let a = db.create_feed(user.id, "A", "https://a.example.com/rss").await.unwrap();
            let b = db.create_feed(user.id, "B", "https://b.example.com/rss").await.unwrap();
            let c = db.create_feed(user.id, "C", "https://c.example.com/rss").await.unwrap();

            db.mark_feed_fetched_at(c.id, now - Duration::minutes(1)).await.unwrap();
            db.mark_feed_fetched_at(b.id, now - Duration::minutes(10)).await.unwrap();

            assert_eq!(db.next_feed_to_fetch().await.unwrap().id, a.id);
            db.mark_feed_fetched(a.id).await.unwrap();

            assert_eq!(db.next_feed_to_fetch().await.unwrap().id, b.id);
            db.mark_feed_fetched(b.id).await.unwrap();

            assert_eq!(db.next_feed_to_fetch().await.unwrap().id, c.id);
        }

        #[tokio::test]
        async fn test_ties_break_by_id() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let first = db.create_feed(user.id, "1", "https://1.example.com/rss").await.unwrap();
            db.create_feed(user.id, "2", "https://2.example.com/rss").await.unwrap();

            assert_eq!(db.next_feed_to_fetch().await.unwrap().id, first.id);
        }

        #[tokio::test]
        async fn test_mark_feed_fetched_returns_updated_feed() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let feed = db.create_feed(user.id, "A", "https://a.example.com/rss").await.unwrap();
            assert!(feed.last_fetched_at.is_none());

            let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
            let marked = db.mark_feed_fetched_at(feed.id, at).await.unwrap();
            assert_eq!(
                marked.last_fetched_at.as_deref(),
                Some("2024-05-01T12:00:00.000000Z")
            );
        }

        #[tokio::test]
        async fn test_mark_missing_feed() {
            let db = create_test_db().await;
            let err = db.mark_feed_fetched(42).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound));
        }
    }

    mod follow_tests {
        use super::*;

        #[tokio::test]
        async fn test_follow_and_unfollow() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let feed = db
                .create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();

            let follow = db.create_feed_follow(user.id, feed.id).await.unwrap();
            assert_eq!(follow.user_name, "owner");
            assert_eq!(follow.feed_name, "Blog");

            let err = db.create_feed_follow(user.id, feed.id).await.unwrap_err();
            assert!(err.is_duplicate());

            assert_eq!(db.feed_follows_for_user(user.id).await.unwrap().len(), 1);
            db.delete_feed_follow(user.id, feed.id).await.unwrap();
            assert!(db.feed_follows_for_user(user.id).await.unwrap().is_empty());

            let err = db.delete_feed_follow(user.id, feed.id).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound));
        }
    }

    mod post_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_post() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let feed = db
                .create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();

            let published = Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap();
            let post = db
                .create_post(&NewPost {
                    feed_id: feed.id,
                    title: "A",
                    url: "https://blog.example.com/a",
                    description: "first",
                    published_at: Some(published),
                })
                .await
                .unwrap();

            assert_eq!(post.title, "A");
            assert_eq!(post.description, "first");
            assert_eq!(
                post.published_at.as_deref(),
                Some("2006-01-02T22:04:05.000000Z")
            );
        }

        #[tokio::test]
        async fn test_duplicate_post_url() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let feed = db
                .create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();

            db.create_post(&new_post(feed.id, "A", "https://blog.example.com/a"))
                .await
                .unwrap();
            let err = db
                .create_post(&new_post(feed.id, "A-dup", "https://blog.example.com/a"))
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                StoreError::Duplicate { entity: "post", ref key } if key == "https://blog.example.com/a"
            ));
            assert_eq!(db.count_posts().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn test_posts_for_user_newest_first() {
            let db = create_test_db().await;
            let user = create_owner(&db).await;
            let other = db.create_user("other").await.unwrap();
            let followed = db
                .create_feed(user.id, "Blog", "https://blog.example.com/rss")
                .await
                .unwrap();
            let ignored = db
                .create_feed(other.id, "Other", "https://other.example.com/rss")
                .await
                .unwrap();
            db.create_feed_follow(user.id, followed.id).await.unwrap();

            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            for (i, url) in ["https://blog.example.com/1", "https://blog.example.com/2"]
                .into_iter()
                .enumerate()
            {
                db.create_post(&NewPost {
                    feed_id: followed.id,
                    title: url,
                    url,
                    description: "",
                    published_at: Some(base + Duration::days(i as i64)),
                })
                .await
                .unwrap();
            }
            db.create_post(&new_post(followed.id, "undated", "https://blog.example.com/u"))
                .await
                .unwrap();
            db.create_post(&new_post(ignored.id, "elsewhere", "https://other.example.com/x"))
                .await
                .unwrap();

            let posts = db.posts_for_user(user.id, 10).await.unwrap();
            let urls: Vec<_> = posts.iter().map(|p| p.url.as_str()).collect();
            assert_eq!(
                urls,
                vec![
                    "https://blog.example.com/2",
                    "https://blog.example.com/1",
                    "https://blog.example.com/u",
                ]
            );

            assert_eq!(db.posts_for_user(user.id, 1).await.unwrap().len(), 1);
        }
    }
}
