pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transforms raw asset bytes into the typed in-memory value.
///
/// Must be pure with respect to stored state; any returned error means
/// "this payload is invalid" and the coordinator will keep the previous
/// good asset.
pub trait Materializer<A>: Send + Sync {
    fn materialize(&self, bytes: &[u8]) -> Result<A, BoxError>;
}

impl<A, F> Materializer<A> for F
where
    F: Fn(&[u8]) -> Result<A, BoxError> + Send + Sync,
{
    fn materialize(&self, bytes: &[u8]) -> Result<A, BoxError> {
        (self)(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_materializer() {
        let materializer = |bytes: &[u8]| -> Result<String, BoxError> {
            String::from_utf8(bytes.to_vec()).map_err(Into::into)
        };

        assert_eq!(materializer.materialize(b"hello").unwrap(), "hello");
        assert!(materializer.materialize(&[0xff, 0xfe]).is_err());
    }
}
