//! Profile / Search Parser (C2): turns a [`crate::scholar_source::FetchResult`]
//! into a typed, classified page.

mod markers;
pub mod profile;
pub mod search;

pub use profile::{ParseState, ParsedProfilePage, PublicationCandidate};
pub use search::{AuthorSearchCandidate, ParsedAuthorSearchPage};
