use sha2::{Digest, Sha256};

/// 计算资源内容的哈希值
///
/// # Arguments
/// * `bytes` - 资源的原始字节
///
/// # Returns
/// 返回64位的十六进制 SHA-256 摘要
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// 计算URL的哈希值
///
/// # Arguments
/// * `url` - 要计算哈希的URL字符串
///
/// # Returns
/// 返回16位的十六进制哈希字符串，跨进程稳定
pub fn hash_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let hash = content_hash(b"base");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        // Pure function of the bytes.
        assert_eq!(hash, content_hash(b"base"));
        assert_ne!(hash, content_hash(b"remote"));
    }

    #[test]
    fn test_hash_url() {
        let url = "http://example.com/logo.png";
        let hash = hash_url(url);
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_url(url));
        assert_ne!(hash, hash_url("http://example.com/other.png"));
    }
}
