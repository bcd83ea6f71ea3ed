//! The two Lua scripts that carry out admission and reconciliation.
//!
//! Both are loaded once at startup via `SCRIPT LOAD` and invoked by SHA
//! thereafter, falling back to `EVAL` on `NOSCRIPT` (e.g. after a Redis
//! restart flushed the script cache) — the same `redis::Script` pattern the
//! corpus's Redis-backed limiter stores use, just with richer Lua bodies.

use deadpool_redis::redis::Script;

/// KEYS: idx_req, buckets_req, total_req, idx_in, buckets_in, total_in,
///       idx_out, buckets_out, total_out  (9 keys, 3 per dimension)
/// ARGV: window_secs, slack_secs, rpm, itpm, otpm, in_req, out_req_est
///
/// `now_ms` is read from Redis's own `TIME` command, not passed by the
/// caller — node clocks are never trusted.
///
/// Returns one of:
///   {1, submit_second}                          -- ALLOW
///   {0, dimension_index, retry_after_ms}         -- DENY (0=req,1=in,2=out)
pub fn admission_script() -> Script {
    Script::new(ADMISSION_LUA)
}

/// KEYS: idx_out, buckets_out, total_out
/// ARGV: submit_second, delta, window_secs
///
/// `now_secs` is likewise read from Redis's `TIME`, not the caller.
///
/// Returns 1 if applied, 0 if the bucket had already aged out.
pub fn reconcile_script() -> Script {
    Script::new(RECONCILE_LUA)
}

const ADMISSION_LUA: &str = r#"
local dims = {"req", "in", "out"}
local idx_keys = {KEYS[1], KEYS[4], KEYS[7]}
local bucket_keys = {KEYS[2], KEYS[5], KEYS[8]}
local total_keys = {KEYS[3], KEYS[6], KEYS[9]}

local time = redis.call('TIME')
local now_ms = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

local window = tonumber(ARGV[1])
local slack = tonumber(ARGV[2])
local limits = {tonumber(ARGV[3]), tonumber(ARGV[4]), tonumber(ARGV[5])}
local incoming = {1, tonumber(ARGV[6]), tonumber(ARGV[7])}

local t = math.floor(now_ms / 1000)
local cutoff = t - window
local ttl = window + slack

-- prune expired seconds out of each dimension's index/bucket/aggregate
for i = 1, 3 do
  local expired = redis.call('ZRANGEBYSCORE', idx_keys[i], '-inf', cutoff)
  for _, t_e in ipairs(expired) do
    local value = tonumber(redis.call('HGET', bucket_keys[i], t_e)) or 0
    if value ~= 0 then
      redis.call('DECRBY', total_keys[i], value)
    end
    redis.call('HDEL', bucket_keys[i], t_e)
    redis.call('ZREM', idx_keys[i], t_e)
  end
  local agg = tonumber(redis.call('GET', total_keys[i])) or 0
  if agg < 0 then
    redis.call('SET', total_keys[i], 0)
  end
end

-- check all three dimensions against the post-prune aggregates
local projected = {}
local violating = -1
for i = 1, 3 do
  local agg = tonumber(redis.call('GET', total_keys[i])) or 0
  projected[i] = agg + incoming[i]
  if violating == -1 and projected[i] > limits[i] then
    violating = i
  end
end

if violating ~= -1 then
  local oldest = redis.call('ZRANGE', idx_keys[violating], 0, 0, 'WITHSCORES')
  local retry_after_ms = 1000 - (now_ms % 1000)
  if oldest[2] ~= nil then
    local oldest_t = tonumber(oldest[2])
    -- oldest_t's bucket is first prunable once a future call's t' >= oldest_t + window
    local age_out_ms = (oldest_t + window) * 1000 - now_ms
    if age_out_ms > retry_after_ms then
      retry_after_ms = age_out_ms
    end
  end
  return {0, violating - 1, retry_after_ms}
end

-- admit: record usage for second t in all three dimensions
for i = 1, 3 do
  if incoming[i] ~= 0 then
    redis.call('HINCRBY', bucket_keys[i], t, incoming[i])
    redis.call('INCRBY', total_keys[i], incoming[i])
  else
    redis.call('HSETNX', bucket_keys[i], t, 0)
  end
  redis.call('ZADD', idx_keys[i], t, t)
  redis.call('EXPIRE', idx_keys[i], ttl)
  redis.call('EXPIRE', bucket_keys[i], ttl)
  redis.call('EXPIRE', total_keys[i], ttl)
end

return {1, t}
"#;

const RECONCILE_LUA: &str = r#"
local idx_key = KEYS[1]
local bucket_key = KEYS[2]
local total_key = KEYS[3]

local submit_second = tonumber(ARGV[1])
local delta = tonumber(ARGV[2])
local window = tonumber(ARGV[3])

local time = redis.call('TIME')
local now_secs = tonumber(time[1])

if submit_second <= now_secs - window then
  return 0
end

if delta == 0 then
  return 1
end

local current = tonumber(redis.call('HGET', bucket_key, submit_second))
if current == nil then
  return 0
end

local updated = current + delta
if updated < 0 then
  delta = -current
  updated = 0
end

redis.call('HSET', bucket_key, submit_second, updated)
redis.call('INCRBY', total_key, delta)

local agg = tonumber(redis.call('GET', total_key)) or 0
if agg < 0 then
  redis.call('SET', total_key, 0)
end

return 1
"#;
