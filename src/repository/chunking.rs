//! Splitting user-id lists into bounded chunk payloads and back.

/// Maximum number of user ids stored in one chunk row.
pub const USER_CHUNK_SIZE: usize = 100;

pub const USER_ID_DELIMITER: &str = ",";

/// Splits `items` into consecutive sublists of at most `chunk_size` elements.
///
/// Absent input is treated as empty and yields no chunks. Concatenating the
/// output in order reproduces the input.
#[must_use]
pub fn chunk_by<T: Clone>(items: Option<&[T]>, chunk_size: usize) -> Vec<Vec<T>> {
    items
        .unwrap_or_default()
        .chunks(chunk_size.max(1))
        .map(<[T]>::to_vec)
        .collect()
}

/// Chunk payloads for `user_ids`, each a delimited list of up to [`USER_CHUNK_SIZE`] ids.
#[must_use]
pub fn join_user_chunks(user_ids: &[String]) -> Vec<String> {
    chunk_by(Some(user_ids), USER_CHUNK_SIZE)
        .into_iter()
        .map(|chunk| chunk.join(USER_ID_DELIMITER))
        .collect()
}

pub fn split_user_chunk(payload: &str) -> impl Iterator<Item = &str> {
    payload.split(USER_ID_DELIMITER)
}
