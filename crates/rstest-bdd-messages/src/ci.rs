//! Continuous integration detection from environment variables.
//!
//! Detection never fails: an unrecognised or incomplete environment simply
//! yields no [`Ci`] record and the field is left out of the run metadata.

use std::collections::BTreeMap;

use crate::messages::{Ci, Git};

/// Snapshot of process environment variables.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ci::Environment;
///
/// let env = Environment::from_iter([("CI", "true")]);
/// assert_eq!(env.get("CI"), Some("true"));
/// assert_eq!(env.get("HOME"), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Capture the variables of the current process.
    #[must_use]
    pub fn capture() -> Self {
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    /// Value of `name`; empty values count as unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn owned(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_owned)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Inspects an environment for signs of a CI service.
pub trait CiDetector {
    /// Describe the CI service, or `None` when none is recognised.
    fn detect(&self, env: &Environment) -> Option<Ci>;
}

/// Detector that never reports a CI service.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCi;

impl CiDetector for NoCi {
    fn detect(&self, _env: &Environment) -> Option<Ci> {
        None
    }
}

/// Environment variable names a CI service uses to describe a build.
struct ServiceVars {
    name: &'static str,
    marker: &'static str,
    url: fn(&Environment) -> Option<String>,
    build_number: &'static str,
    remote: fn(&Environment) -> Option<String>,
    revision: &'static str,
    branch: &'static [&'static str],
    tag: &'static [&'static str],
}

fn github_url(env: &Environment) -> Option<String> {
    Some(format!(
        "{}/{}/actions/runs/{}",
        env.get("GITHUB_SERVER_URL")?,
        env.get("GITHUB_REPOSITORY")?,
        env.get("GITHUB_RUN_ID")?
    ))
}

fn github_remote(env: &Environment) -> Option<String> {
    Some(format!(
        "{}/{}.git",
        env.get("GITHUB_SERVER_URL")?,
        env.get("GITHUB_REPOSITORY")?
    ))
}

const SERVICES: &[ServiceVars] = &[
    ServiceVars {
        name: "GitHub Actions",
        marker: "GITHUB_ACTIONS",
        url: github_url,
        build_number: "GITHUB_RUN_ID",
        remote: github_remote,
        revision: "GITHUB_SHA",
        branch: &["GITHUB_HEAD_REF", "GITHUB_REF_NAME"],
        tag: &[],
    },
    ServiceVars {
        name: "GitLab",
        marker: "GITLAB_CI",
        url: |env: &Environment| env.owned("CI_PIPELINE_URL"),
        build_number: "CI_JOB_ID",
        remote: |env: &Environment| env.owned("CI_REPOSITORY_URL"),
        revision: "CI_COMMIT_SHA",
        branch: &["CI_COMMIT_BRANCH"],
        tag: &["CI_COMMIT_TAG"],
    },
    ServiceVars {
        name: "CircleCI",
        marker: "CIRCLECI",
        url: |env: &Environment| env.owned("CIRCLE_BUILD_URL"),
        build_number: "CIRCLE_BUILD_NUM",
        remote: |env: &Environment| env.owned("CIRCLE_REPOSITORY_URL"),
        revision: "CIRCLE_SHA1",
        branch: &["CIRCLE_BRANCH"],
        tag: &["CIRCLE_TAG"],
    },
    ServiceVars {
        name: "Jenkins",
        marker: "JENKINS_URL",
        url: |env: &Environment| env.owned("BUILD_URL"),
        build_number: "BUILD_NUMBER",
        remote: |env: &Environment| env.owned("GIT_URL"),
        revision: "GIT_COMMIT",
        branch: &["GIT_LOCAL_BRANCH", "GIT_BRANCH"],
        tag: &[],
    },
];

impl ServiceVars {
    fn describe(&self, env: &Environment) -> Option<Ci> {
        env.get(self.marker)?;
        let url = (self.url)(env)?;
        Some(Ci {
            name: self.name.to_owned(),
            url,
            build_number: env.owned(self.build_number),
            git: self.git(env),
        })
    }

    fn git(&self, env: &Environment) -> Option<Git> {
        let remote = (self.remote)(env)?;
        let revision = env.owned(self.revision)?;
        let branch = self.branch.iter().find_map(|name| env.owned(name));
        let tag = self.tag.iter().find_map(|name| env.owned(name));
        Some(Git {
            remote,
            revision,
            branch,
            tag,
        })
    }
}

/// Detector recognising GitHub Actions, GitLab CI, CircleCI and Jenkins.
///
/// A service is reported only when its marker variable and build URL are
/// both present. Git details are attached when the remote and revision are
/// known.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ci::{CiDetector, EnvCiDetector, Environment};
///
/// let env = Environment::from_iter([
///     ("CIRCLECI", "true"),
///     ("CIRCLE_BUILD_URL", "https://circleci.com/gh/acme/app/42"),
/// ]);
/// let ci = EnvCiDetector.detect(&env).unwrap();
/// assert_eq!(ci.name, "CircleCI");
/// assert!(ci.git.is_none());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCiDetector;

impl CiDetector for EnvCiDetector {
    fn detect(&self, env: &Environment) -> Option<Ci> {
        SERVICES.iter().find_map(|service| service.describe(env))
    }
}
