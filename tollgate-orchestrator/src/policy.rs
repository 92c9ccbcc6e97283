//! Policy engine
//!
//! Decides whether a deployment may proceed. Every rule is evaluated on every
//! call so that a single run reports all violations at once. Evaluation is a
//! pure function of its inputs.

use std::collections::HashSet;
use tollgate_core::domain::image::ImageRef;
use tollgate_core::domain::policy::PolicyDecision;
use tollgate_core::domain::request::DeploymentRequest;
use tollgate_core::domain::scan::ScanResult;

/// Reason recorded when the request is not on the deploy branch
pub const BRANCH_NOT_MAIN: &str = "branch-not-main";

/// Policy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Branch that is allowed to deploy
    pub deploy_branch: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            deploy_branch: "main".to_string(),
        }
    }
}

/// Evaluates deployment gates
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Evaluates all rules against a request
    ///
    /// `images` are the images as they will be pushed, with runtime users
    /// resolved; they may differ from `request.images()` only in that field.
    pub fn evaluate(
        &self,
        request: &DeploymentRequest,
        images: &[ImageRef],
        scan: &ScanResult,
    ) -> PolicyDecision {
        let mut reasons = Vec::new();

        if request.branch() != self.config.deploy_branch {
            reasons.push(BRANCH_NOT_MAIN.to_string());
        }

        // Tags of one repository share a reason
        let mut flagged = HashSet::new();
        for image in images {
            if !is_non_root_user(image.runtime_user.as_deref())
                && flagged.insert(image.repository.as_str())
            {
                reasons.push(format!("runtime-user-is-root:{}", image.repository));
            }
        }

        if scan.count > 0 {
            reasons.push(format!("secret-scan-failed:{}", scan.count));
        }

        PolicyDecision::from_reasons(reasons)
    }
}

/// Whether a configured container user is a non-root account
///
/// Accepts `user`, `uid`, `user:group` and `uid:gid`. An unset or empty user
/// means the container runs as root.
pub fn is_non_root_user(user: Option<&str>) -> bool {
    let Some(user) = user.map(str::trim) else {
        return false;
    };
    let account = user.split(':').next().unwrap_or_default().trim();

    if account.is_empty() || account == "root" {
        return false;
    }

    match account.parse::<u64>() {
        Ok(uid) => uid != 0,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::domain::scan::SecretMatch;

    fn request(branch: &str, images: Vec<ImageRef>) -> DeploymentRequest {
        DeploymentRequest::new(branch, "abc123", "1", images)
    }

    fn image(repo: &str, user: &str) -> ImageRef {
        ImageRef::new(repo, "1").with_runtime_user(user)
    }

    fn dirty_scan(count: usize) -> ScanResult {
        ScanResult::from_matches(
            (0..count)
                .map(|i| SecretMatch {
                    path: "src/config.js".to_string(),
                    line: i + 1,
                    rule: "hardcoded-password".to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_non_root_user() {
        assert!(is_non_root_user(Some("nextjs")));
        assert!(is_non_root_user(Some("1001")));
        assert!(is_non_root_user(Some("node:node")));
        assert!(is_non_root_user(Some("1000:0")));

        assert!(!is_non_root_user(None));
        assert!(!is_non_root_user(Some("")));
        assert!(!is_non_root_user(Some("root")));
        assert!(!is_non_root_user(Some("0")));
        assert!(!is_non_root_user(Some("00")));
        assert!(!is_non_root_user(Some("0:1000")));
        assert!(!is_non_root_user(Some("root:root")));
    }

    #[test]
    fn test_feature_branch_is_denied() {
        let engine = PolicyEngine::default();
        let images = vec![image("be", "nextjs")];
        let decision = engine.evaluate(
            &request("feature/x", images.clone()),
            &images,
            &ScanResult::clean(),
        );

        assert!(!decision.allowed());
        assert_eq!(decision.reasons(), ["branch-not-main".to_string()]);
    }

    #[test]
    fn test_branch_rule_holds_regardless_of_other_rules() {
        let engine = PolicyEngine::default();
        let images = vec![image("be", "root"), image("fe", "")];
        let decision = engine.evaluate(&request("dev", images.clone()), &images, &dirty_scan(3));

        assert!(!decision.allowed());
        assert!(decision.reason_set().contains("branch-not-main"));
    }

    #[test]
    fn test_root_image_is_denied() {
        let engine = PolicyEngine::default();
        let images = vec![image("be", "root")];
        let decision =
            engine.evaluate(&request("main", images.clone()), &images, &ScanResult::clean());

        assert!(!decision.allowed());
        assert_eq!(decision.reasons(), ["runtime-user-is-root:be".to_string()]);
    }

    #[test]
    fn test_root_reason_once_per_repository() {
        let engine = PolicyEngine::default();
        let images = vec![
            ImageRef::new("be", "1").with_runtime_user("root"),
            ImageRef::new("be", "2").with_runtime_user("root"),
            ImageRef::new("fe", "1").with_runtime_user("0"),
        ];
        let decision =
            engine.evaluate(&request("main", images.clone()), &images, &ScanResult::clean());

        assert_eq!(
            decision.reasons(),
            [
                "runtime-user-is-root:be".to_string(),
                "runtime-user-is-root:fe".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_root_images_contribute_no_reason() {
        let engine = PolicyEngine::default();
        let images = vec![image("be", "nextjs"), image("fe", "1001")];
        let decision =
            engine.evaluate(&request("main", images.clone()), &images, &ScanResult::clean());

        assert!(decision.allowed());
        assert!(decision.reasons().is_empty());
    }

    #[test]
    fn test_all_violations_are_reported() {
        let engine = PolicyEngine::default();
        let images = vec![image("be", "root"), image("fe", "0"), image("api", "app")];
        let decision = engine.evaluate(
            &request("feature/y", images.clone()),
            &images,
            &dirty_scan(2),
        );

        assert!(!decision.allowed());
        assert_eq!(
            decision.reasons(),
            [
                "branch-not-main".to_string(),
                "runtime-user-is-root:be".to_string(),
                "runtime-user-is-root:fe".to_string(),
                "secret-scan-failed:2".to_string(),
            ]
        );
    }

    #[test]
    fn test_evaluate_is_pure() {
        let engine = PolicyEngine::default();
        let images = vec![image("be", "root"), image("fe", "nextjs")];
        let req = request("feature/x", images.clone());
        let scan = dirty_scan(1);

        let first = engine.evaluate(&req, &images, &scan);
        for _ in 0..10 {
            let again = engine.evaluate(&req, &images, &scan);
            assert_eq!(again.allowed(), first.allowed());
            assert_eq!(again.reason_set(), first.reason_set());
        }
    }

    #[test]
    fn test_configured_deploy_branch() {
        let engine = PolicyEngine::new(PolicyConfig {
            deploy_branch: "release".to_string(),
        });
        let images = vec![image("be", "nextjs")];

        let on_release =
            engine.evaluate(&request("release", images.clone()), &images, &ScanResult::clean());
        assert!(on_release.allowed());

        let on_main =
            engine.evaluate(&request("main", images.clone()), &images, &ScanResult::clean());
        assert_eq!(on_main.reasons(), ["branch-not-main".to_string()]);
    }
}
