pub mod error;
pub mod realtime;
pub mod supabase;

pub use error::DatabaseError;
pub use realtime::{ChangeFeed, ChangeKind, RowChange, Subscription};
pub use supabase::SupabaseClient;
