use crate::common::{JobKey, JobRequest, PackageList, Result};

/// 构造一次 LSC 任务的请求 JSON
///
/// - scan_id / host_ip 不能为空 (去掉空白后)，否则返回 `LscError::Encoding`。
/// - hostname / os_release / package_list 允许为空。
/// - 输出为紧凑 JSON，字段顺序固定:
///   `scan_id, host_ip, hostname, os_release, package_list`。
///
/// 纯函数，没有任何副作用。
pub fn encode_request(
    scan_id: &str,
    host_ip: &str,
    hostname: &str,
    os_release: &str,
    package_list: &PackageList,
) -> Result<String> {
    let key = JobKey::new(scan_id, host_ip)?;
    let request = JobRequest::new(key, hostname, os_release, package_list.clone());
    request.to_json()
}

impl JobRequest {
    /// 序列化为请求 JSON
    ///
    /// 重新校验标识，防止手工构造的 JobRequest 绕过 `JobKey::new`。
    pub fn to_json(&self) -> Result<String> {
        JobKey::new(self.scan_id.as_str(), self.host_ip.as_str())?;
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LscError;

    #[test]
    fn encodes_canonical_document() {
        let json = encode_request(
            "s1",
            "10.0.0.1",
            "",
            "debian10",
            &PackageList::new(["libssl1.1=1.1.1"]),
        )
        .unwrap();
        assert_eq!(
            json,
            r#"{"scan_id":"s1","host_ip":"10.0.0.1","hostname":"","os_release":"debian10","package_list":["libssl1.1=1.1.1"]}"#
        );
    }

    #[test]
    fn empty_release_and_packages_are_allowed() {
        let json = encode_request("s1", "::1", "web01", "", &PackageList::default()).unwrap();
        assert_eq!(
            json,
            r#"{"scan_id":"s1","host_ip":"::1","hostname":"web01","os_release":"","package_list":[]}"#
        );
    }

    #[test]
    fn escapes_awkward_package_names() {
        let json = encode_request(
            "s1",
            "10.0.0.1",
            "",
            "rhel8",
            &PackageList::new(["we\"ird\tpkg", "ünïcode-1.0"]),
        )
        .unwrap();
        let back: JobRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.package_list.iter().collect::<Vec<_>>(),
            vec!["we\"ird\tpkg", "ünïcode-1.0"]
        );
    }

    #[test]
    fn rejects_missing_identity() {
        let pkgs = PackageList::new(["bash=5.1"]);
        assert!(matches!(
            encode_request("", "10.0.0.1", "", "debian10", &pkgs),
            Err(LscError::Encoding(_))
        ));
        assert!(matches!(
            encode_request("s1", " ", "", "debian10", &pkgs),
            Err(LscError::Encoding(_))
        ));

        let forged = JobRequest {
            scan_id: String::new(),
            host_ip: "10.0.0.1".into(),
            hostname: String::new(),
            os_release: String::new(),
            package_list: pkgs,
        };
        assert!(matches!(forged.to_json(), Err(LscError::Encoding(_))));
    }
}
