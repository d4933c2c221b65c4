//! Lua scripts for atomic room record operations.
//!
//! Room records live in one Redis HASH per room id (`lc:room:{room_id}`):
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `sid` | Session id of the current/last session |
//! | `is_running` | `1` while running, `0` once finished |
//! | `creation_time` | Unix seconds reported by the media server |
//! | `created` | Creation time formatted `YYYY-MM-DD HH:MM:SS` (UTC) |
//! | `ended` | End time formatted like `created`, empty while running |
//! | `participants` | Genuine participant count (may go negative) |
//! | `metadata` | Room metadata blob |
//!
//! Every script runs atomically on the Redis server, so concurrent webhook
//! deliveries for the same room never lose updates.

/// Insert or update a room record when a session starts.
///
/// Arguments:
/// - KEYS[1]: Room key
/// - ARGV[1]: Session id
/// - ARGV[2]: Creation time (unix seconds)
/// - ARGV[3]: Creation time (formatted)
/// - ARGV[4]: Metadata blob
/// - ARGV[5]: `1` for insert-only, `0` for upsert
///
/// Returns:
/// - 1: Record written
/// - 0: Record exists and insert-only was requested
/// - -1: Refused, the record for this session id is already finished, or
///   the start belongs to a session older than the stored one
pub const UPSERT_ROOM: &str = r"
local exists = redis.call('EXISTS', KEYS[1])
if exists == 1 then
    if ARGV[5] == '1' then
        return 0
    end
    local sid = redis.call('HGET', KEYS[1], 'sid')
    local running = redis.call('HGET', KEYS[1], 'is_running')
    if sid == ARGV[1] and running == '0' then
        return -1
    end
    if sid ~= ARGV[1] then
        local stored = tonumber(redis.call('HGET', KEYS[1], 'creation_time'))
        if stored and tonumber(ARGV[2]) < stored then
            return -1
        end
        -- New session for a reused room id starts from a clean count
        redis.call('HSET', KEYS[1], 'participants', 0, 'ended', '')
    end
else
    redis.call('HSET', KEYS[1], 'participants', 0, 'ended', '')
end

redis.call('HSET', KEYS[1],
    'sid', ARGV[1],
    'is_running', 1,
    'creation_time', ARGV[2],
    'created', ARGV[3],
    'metadata', ARGV[4])
return 1
";

/// Mark a running room record as finished.
///
/// Arguments:
/// - KEYS[1]: Room key
/// - ARGV[1]: Session id (empty matches any)
/// - ARGV[2]: End time (formatted)
///
/// Returns:
/// - 1: Record transitioned to finished
/// - 0: No record, or already finished
/// - -1: Record belongs to a different session
pub const FINISH_ROOM: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local sid = redis.call('HGET', KEYS[1], 'sid')
if ARGV[1] ~= '' and sid ~= ARGV[1] then
    return -1
end
if redis.call('HGET', KEYS[1], 'is_running') == '0' then
    return 0
end
redis.call('HSET', KEYS[1], 'is_running', 0, 'ended', ARGV[2])
return 1
";

/// Apply a participant count delta.
///
/// Arguments:
/// - KEYS[1]: Room key
/// - ARGV[1]: Session id (empty matches any)
/// - ARGV[2]: Signed delta
///
/// Returns:
/// - New participant count
/// - nil: No record, or record belongs to a different session
pub const ADJUST_PARTICIPANTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
local sid = redis.call('HGET', KEYS[1], 'sid')
if ARGV[1] ~= '' and sid ~= ARGV[1] then
    return false
end
return redis.call('HINCRBY', KEYS[1], 'participants', ARGV[2])
";

/// Replace the metadata blob of the current session.
///
/// Arguments:
/// - KEYS[1]: Room key
/// - ARGV[1]: Session id (empty matches any)
/// - ARGV[2]: Metadata blob
///
/// Returns:
/// - 1: Metadata written
/// - 0: No record, or record belongs to a different session
pub const UPDATE_METADATA: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
if ARGV[1] ~= '' and redis.call('HGET', KEYS[1], 'sid') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'metadata', ARGV[2])
return 1
";

/// Finalize speech-service accounting for a room session.
///
/// Arguments:
/// - KEYS[1]: Speech usage key (`lc:speech:{room_id}`)
/// - ARGV[1]: Session id that ended
/// - ARGV[2]: End time (unix seconds)
///
/// Returns:
/// - 1: Usage finalized and open user sessions closed
/// - 0: Nothing tracked, or tracked usage belongs to another session
pub const FINALIZE_SPEECH: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
if redis.call('HGET', KEYS[1], 'sid') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'ended_at', ARGV[2], 'active', 0)
redis.call('DEL', KEYS[1] .. ':users')
return 1
";

/// Close one user's open speech-to-text session.
///
/// Arguments:
/// - KEYS[1]: Speech usage key (`lc:speech:{room_id}`)
/// - ARGV[1]: Session id
/// - ARGV[2]: User identity
/// - ARGV[3]: End time (unix seconds)
///
/// Returns:
/// - Seconds of usage added for the user
/// - 0: No open session for the user (or another room session)
pub const END_SPEECH_USER: &str = r"
if redis.call('HGET', KEYS[1], 'sid') ~= ARGV[1] then
    return 0
end
local users_key = KEYS[1] .. ':users'
local started = redis.call('HGET', users_key, ARGV[2])
if not started then
    return 0
end
redis.call('HDEL', users_key, ARGV[2])
local used = tonumber(ARGV[3]) - tonumber(started)
if used < 0 then
    used = 0
end
redis.call('HINCRBY', KEYS[1], 'usage_seconds', used)
return used
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_touch_expected_fields() {
        assert!(UPSERT_ROOM.contains("is_running"));
        assert!(UPSERT_ROOM.contains("participants"));
        assert!(UPSERT_ROOM.contains("tonumber(ARGV[2]) < stored"));
        assert!(FINISH_ROOM.contains("'ended'"));
        assert!(ADJUST_PARTICIPANTS.contains("HINCRBY"));
        assert!(UPDATE_METADATA.contains("'metadata'"));
        assert!(FINALIZE_SPEECH.contains("ended_at"));
        assert!(END_SPEECH_USER.contains("usage_seconds"));
    }

    #[test]
    fn test_session_guard_present_in_every_write() {
        for script in [
            FINISH_ROOM,
            ADJUST_PARTICIPANTS,
            UPDATE_METADATA,
            FINALIZE_SPEECH,
            END_SPEECH_USER,
        ] {
            assert!(
                script.contains("'sid'"),
                "script must compare the stored session id"
            );
        }
    }
}
