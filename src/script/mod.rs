use lazy_static::lazy_static;

use crate::utils::sha1_hex;

// A server-side atomic program together with the digest under which the
// servers cache it. Changing a source is a compatibility break: servers
// may still hold the old digest.
#[derive(Debug)]
pub struct Script {
    pub source: &'static str,
    pub digest: String,
}

impl Script {
    fn new(source: &'static str) -> Script {
        Script {
            digest: sha1_hex(source.as_bytes()),
            source,
        }
    }
}

// Sets every key to the caller's value, unless any key is already held
// under a different value.
const ACQUIRE_SOURCE: &str = r#"for _, key in ipairs(KEYS) do
    local value = redis.call("get", key)
    if value ~= false and value ~= ARGV[1] then
        return 0
    end
end
for _, key in ipairs(KEYS) do
    redis.call("set", key, ARGV[1], "px", ARGV[2])
end
return 1
"#;

// Refreshes the TTL on every key, provided all of them still hold the
// caller's value. Verification happens before any expiration is touched.
const EXTEND_SOURCE: &str = r#"for _, key in ipairs(KEYS) do
    if redis.call("get", key) ~= ARGV[1] then
        return 0
    end
end
for _, key in ipairs(KEYS) do
    redis.call("pexpire", key, ARGV[2])
end
return 1
"#;

// Deletes every key still holding the caller's value. Returns the number
// of keys deleted.
const RELEASE_SOURCE: &str = r#"local deleted = 0
for _, key in ipairs(KEYS) do
    if redis.call("get", key) == ARGV[1] then
        redis.call("del", key)
        deleted = deleted + 1
    end
end
return deleted
"#;

lazy_static! {
    pub static ref ACQUIRE_SCRIPT: Script = Script::new(ACQUIRE_SOURCE);
    pub static ref EXTEND_SCRIPT: Script = Script::new(EXTEND_SOURCE);
    pub static ref RELEASE_SCRIPT: Script = Script::new(RELEASE_SOURCE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_digests_are_stable() {
        let cases: [(&Script, &str); 3] = [
            (&ACQUIRE_SCRIPT, "568c173470e9f59999f6d26f3606d92397170b0c"),
            (&EXTEND_SCRIPT, "93fe59ebb0a0787817b76a9a3cb426896509cedd"),
            (&RELEASE_SCRIPT, "4e90a5a877e1fe74d3d53d9af708cc6273a4aa8d"),
        ];
        for (script, expected) in cases.iter() {
            assert_eq!(script.digest, *expected);
        }
    }

    #[test]
    fn test_script_digests_are_distinct() {
        assert_ne!(ACQUIRE_SCRIPT.digest, EXTEND_SCRIPT.digest);
        assert_ne!(EXTEND_SCRIPT.digest, RELEASE_SCRIPT.digest);
        assert_ne!(ACQUIRE_SCRIPT.digest, RELEASE_SCRIPT.digest);
    }
}
