//! Database handle, schema bootstrap and write serialization.

use crate::orm::{broadcasts, comments, post_votes, posts, reports, sessions, users};
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, Schema, TransactionTrait,
};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Shared storage handle.
///
/// Reads go straight to the pool. Every mutation goes through
/// [`Store::begin_write`], which serializes writers process-wide and wraps
/// the mutation in one transaction.
pub struct Store {
    db: DatabaseConnection,
    write_lock: Mutex<()>,
}

/// An open write transaction holding the global write lock.
///
/// Dropping without [`WriteTxn::commit`] rolls back. The transaction is
/// declared first so it is rolled back before the lock is released.
pub struct WriteTxn<'a> {
    txn: DatabaseTransaction,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> WriteTxn<'a> {
    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), DbErr> {
        let WriteTxn { txn, _guard } = self;
        txn.commit().await
    }
}

impl Store {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Connect, create missing tables and indexes, and return the handle.
    pub async fn connect(url: &str) -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new(url.to_owned());
        opt.sqlx_logging(false);

        if url.contains(":memory:") {
            // A memory database lives only as long as its connection.
            opt.max_connections(1)
                .min_connections(1)
                .idle_timeout(Duration::from_secs(86_400))
                .max_lifetime(Duration::from_secs(86_400));
        }

        let db = Database::connect(opt).await?;
        init_schema(&db).await?;
        log::info!("Database ready ({:?})", db.get_database_backend());

        Ok(Self::new(db))
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Take the global write lock and open a transaction.
    ///
    /// Inside the returned unit, all queries must use [`WriteTxn::txn`]; the
    /// pool may have no other connection to hand out.
    pub async fn begin_write(&self) -> Result<WriteTxn<'_>, DbErr> {
        let guard = self.write_lock.lock().await;
        let txn = self.db.begin().await?;
        Ok(WriteTxn { txn, _guard: guard })
    }
}

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

fn index<C: sea_orm::sea_query::IntoIden + 'static>(
    name: &str,
    table: impl sea_orm::sea_query::IntoTableRef,
    col: C,
) -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(name)
        .table(table)
        .col(col)
        .to_owned()
}

/// Create every table and index that does not exist yet.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    // Parents before children.
    create_table(db, &schema, users::Entity).await?;
    create_table(db, &schema, sessions::Entity).await?;
    create_table(db, &schema, posts::Entity).await?;
    create_table(db, &schema, comments::Entity).await?;
    create_table(db, &schema, post_votes::Entity).await?;
    create_table(db, &schema, reports::Entity).await?;
    create_table(db, &schema, broadcasts::Entity).await?;

    let indexes = [
        index("idx_posts_status", posts::Entity, posts::Column::Status),
        index("idx_posts_tag", posts::Entity, posts::Column::Tag),
        index("idx_reports_post", reports::Entity, reports::Column::PostId),
        index("idx_comments_post", comments::Entity, comments::Column::PostId),
        index("idx_votes_post", post_votes::Entity, post_votes::Column::PostId),
        index("idx_sessions_user", sessions::Entity, sessions::Column::UserId),
    ];
    for stmt in indexes.iter() {
        db.execute(backend.build(stmt)).await?;
    }

    Ok(())
}
