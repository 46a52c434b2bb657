use serde_json::Value;

/// 加载状态枚举
///
/// 区分“不存在”和“存在但损坏”，两者绝不能混为一谈。
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// 成功加载：数据存在且是合法 JSON
    Found(Value),
    /// 数据不存在：对方还没有写入
    NotFound,
    /// 数据损坏：数据存在但无法解析
    DataCorrupted { reason: String, raw_content: String },
}

impl LoadStatus {
    /// 从 Store 读到的原始值构造
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            None => LoadStatus::NotFound,
            Some(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => LoadStatus::Found(v),
                Err(e) => LoadStatus::DataCorrupted {
                    reason: e.to_string(),
                    raw_content: s.to_string(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_corrupted_are_distinct() {
        assert_eq!(LoadStatus::from_raw(None), LoadStatus::NotFound);
        assert!(matches!(
            LoadStatus::from_raw(Some("{\"status\":")),
            LoadStatus::DataCorrupted { raw_content, .. } if raw_content == "{\"status\":"
        ));
        // 空字符串也是“存在但损坏”
        assert!(matches!(
            LoadStatus::from_raw(Some("")),
            LoadStatus::DataCorrupted { .. }
        ));
        assert!(matches!(
            LoadStatus::from_raw(Some("{\"status\":\"running\"}")),
            LoadStatus::Found(_)
        ));
    }
}
