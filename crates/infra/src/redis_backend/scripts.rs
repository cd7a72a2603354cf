//! Lua scripts for atomic queue transitions.
//!
//! All scripts share one key list:
//! `visible, messages, lease_of, leases, retired, retired_of`.

use redis::Script;

/// Moves the current lease of `id` (if any) to the retired set.
const RETIRE_CURRENT: &str = r#"
local function retire(id)
    local previous = redis.call('HGET', KEYS[3], id)
    if previous then
        redis.call('HDEL', KEYS[4], previous)
        redis.call('HSET', KEYS[5], previous, id)
        local list = redis.call('HGET', KEYS[6], id)
        if list then
            redis.call('HSET', KEYS[6], id, list .. ',' .. previous)
        else
            redis.call('HSET', KEYS[6], id, previous)
        end
    end
end
"#;

/// Removes message `id` with its current and retired leases.
const REMOVE_MESSAGE: &str = r#"
local function remove(id)
    local current = redis.call('HGET', KEYS[3], id)
    if current then
        redis.call('HDEL', KEYS[4], current)
    end
    local list = redis.call('HGET', KEYS[6], id)
    if list then
        for lease in string.gmatch(list, '[^,]+') do
            redis.call('HDEL', KEYS[5], lease)
        end
    end
    redis.call('ZREM', KEYS[1], id)
    redis.call('HDEL', KEYS[2], id)
    redis.call('HDEL', KEYS[3], id)
    redis.call('HDEL', KEYS[6], id)
end
"#;

/// ARGV: now_ms, max_count, deadline_ms, lease ids (one per slot)
///
/// Returns a flat list of `message_id, lease_id, body` triples. Ids whose
/// body is gone are dropped from the visibility set.
pub(crate) fn claim() -> Script {
    Script::new(&format!(
        "{RETIRE_CURRENT}{}",
        r#"
        local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
        local out = {}
        for i, id in ipairs(ids) do
            local body = redis.call('HGET', KEYS[2], id)
            if body then
                retire(id)
                local lease = ARGV[3 + i]
                redis.call('ZADD', KEYS[1], ARGV[3], id)
                redis.call('HSET', KEYS[3], id, lease)
                redis.call('HSET', KEYS[4], lease, id)
                table.insert(out, id)
                table.insert(out, lease)
                table.insert(out, body)
            else
                redis.call('ZREM', KEYS[1], id)
            end
        end
        return out
        "#
    ))
}

/// ARGV: lease_id, now_ms, deadline_ms, new_lease_id
///
/// Returns 1 if renewed, 0 if the lease is unknown, superseded or expired.
pub(crate) fn renew() -> Script {
    Script::new(&format!(
        "{RETIRE_CURRENT}{}",
        r#"
        local id = redis.call('HGET', KEYS[4], ARGV[1])
        if not id then
            return 0
        end
        local deadline = redis.call('ZSCORE', KEYS[1], id)
        if not deadline or tonumber(deadline) <= tonumber(ARGV[2]) then
            return 0
        end
        retire(id)
        redis.call('HSET', KEYS[3], id, ARGV[4])
        redis.call('HSET', KEYS[4], ARGV[4], id)
        redis.call('ZADD', KEYS[1], ARGV[3], id)
        return 1
        "#
    ))
}

/// ARGV: lease_id, now_ms
///
/// Returns 1 if the message was removed, 0 if it was already gone and -1 if
/// the lease is expired or superseded.
pub(crate) fn delete_lease() -> Script {
    Script::new(&format!(
        "{REMOVE_MESSAGE}{}",
        r#"
        if redis.call('HEXISTS', KEYS[5], ARGV[1]) == 1 then
            return -1
        end
        local id = redis.call('HGET', KEYS[4], ARGV[1])
        if not id then
            return 0
        end
        local deadline = redis.call('ZSCORE', KEYS[1], id)
        if deadline and tonumber(deadline) <= tonumber(ARGV[2]) then
            return -1
        end
        remove(id)
        return 1
        "#
    ))
}

/// ARGV: message_id
///
/// Unconditionally removes one message; used for undecodable envelopes.
pub(crate) fn discard() -> Script {
    Script::new(&format!(
        "{REMOVE_MESSAGE}{}",
        r#"
        remove(ARGV[1])
        return 1
        "#
    ))
}
