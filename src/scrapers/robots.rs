//! Robots exclusion checking.
//!
//! Rules are fetched once per session before the first page fetch. A failed
//! or unparseable robots.txt defaults to allowing everything, matching how
//! the listing sites themselves treat missing rules.

use texting_robots::Robot;
use tracing::{debug, warn};

/// Evaluated robots.txt rules for one site.
pub struct RobotsPolicy {
    robot: Option<Robot>,
}

impl RobotsPolicy {
    /// A policy that allows every URL.
    pub fn allow_all() -> Self {
        Self { robot: None }
    }

    /// Fetch and parse robots.txt for `base_url`.
    pub async fn fetch(client: &reqwest::Client, base_url: &str, agent: &str) -> Self {
        let robots_url = format!("{}/robots.txt", base_url.trim_end_matches('/'));

        let body = match client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Could not read robots.txt from {}: {}", robots_url, e);
                    return Self::allow_all();
                }
            },
            Ok(resp) => {
                debug!("robots.txt at {} returned {}", robots_url, resp.status());
                return Self::allow_all();
            }
            Err(e) => {
                warn!("Could not fetch robots.txt from {}: {}", robots_url, e);
                return Self::allow_all();
            }
        };

        match Robot::new(agent, &body) {
            Ok(robot) => Self { robot: Some(robot) },
            Err(e) => {
                warn!("Unparseable robots.txt at {}: {}", robots_url, e);
                Self::allow_all()
            }
        }
    }

    /// Whether the rules allow fetching `url`.
    pub fn allows(&self, url: &str) -> bool {
        match &self.robot {
            Some(robot) => robot.allowed(url),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_permits_everything() {
        let policy = RobotsPolicy::allow_all();
        assert!(policy.allows("https://www.pararius.com/apartments/amsterdam"));
    }

    #[test]
    fn test_disallow_rule_is_honored() {
        let body = b"User-agent: *\nDisallow: /admin/\n";
        let robot = Robot::new("rentwatch", body).unwrap();
        let policy = RobotsPolicy { robot: Some(robot) };
        assert!(!policy.allows("https://www.pararius.com/admin/users"));
        assert!(policy.allows("https://www.pararius.com/apartments/amsterdam"));
    }
}
