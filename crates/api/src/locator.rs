//! Build locator strings used to filter the build listing endpoint.

/// Filters for listing builds. Empty strings, zero numbers and `false`
/// flags are left out of the locator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildQuery {
    pub build_type_id: Option<String>,
    pub branch: Option<String>,
    pub user: Option<String>,
    pub count: u32,
    pub start: u32,
    pub lookup_limit: u32,
    pub running: bool,
    pub cancelled: bool,
}

impl BuildQuery {
    /// Locator fragments in the order the server expects them.
    pub fn fragments(&self) -> Vec<String> {
        let mut fragments = Vec::new();

        if let Some(id) = non_empty(&self.build_type_id) {
            fragments.push(format!("buildType:(id:{id})"));
        }
        if let Some(name) = non_empty(&self.branch) {
            fragments.push(format!("branch:(name:{name})"));
        }
        if let Some(user) = non_empty(&self.user) {
            fragments.push(format!("user:{user}"));
        }
        if self.count > 0 {
            fragments.push(format!("count:{}", self.count));
        }
        if self.start > 0 {
            fragments.push(format!("start:{}", self.start));
        }
        if self.lookup_limit > 0 {
            fragments.push(format!("lookupLimit:{}", self.lookup_limit));
        }
        if self.running {
            fragments.push("running:true".to_string());
        }
        if self.cancelled {
            fragments.push("cancelled:true".to_string());
        }

        fragments
    }

    /// Every fragment is terminated by a comma, including the last one.
    pub fn locator(&self) -> String {
        self.fragments()
            .into_iter()
            .map(|fragment| fragment + ",")
            .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
