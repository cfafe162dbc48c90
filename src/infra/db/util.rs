use crate::cache::IndexError;

pub fn map_sqlx_error(err: sqlx::Error) -> IndexError {
    match err {
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            IndexError::from_persistence(format!("statement timed out: {}", db.message()))
        }
        sqlx::Error::PoolTimedOut => IndexError::from_persistence("connection pool timed out"),
        other => IndexError::from_persistence(other),
    }
}
