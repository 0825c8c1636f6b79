//! 配置深度合并

use serde_json::Value;

/// 将 `src` 深度合并到 `dst`
///
/// 两边都是对象时逐键递归合并，否则用 `src` 整体替换 `dst`。
/// 以 `skip_prefix` 开头的键（如 `$`）被忽略。
pub fn merge_values(dst: &mut Value, src: Value, skip_prefix: Option<&str>) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                if skip_prefix.is_some_and(|prefix| key.starts_with(prefix)) {
                    continue;
                }
                match dst_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value, skip_prefix),
                    None => {
                        dst_map.insert(key, value);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}
