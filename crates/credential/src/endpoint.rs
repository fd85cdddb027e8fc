//! Region and endpoint quirks: opt-in regions, FIPS and GovCloud STS.

/// Region used for STS when the target region is opt-in.
pub const STS_FALLBACK_REGION: &str = "us-east-1";

/// Regions that must be explicitly enabled on an account.
pub const OPT_IN_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-east-2",
    "ap-south-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-southeast-5",
    "ap-southeast-7",
    "ca-west-1",
    "eu-central-2",
    "eu-south-1",
    "eu-south-2",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "mx-central-1",
];

const GOVCLOUD_REGIONS: [&str; 2] = ["us-gov-east-1", "us-gov-west-1"];

/// Regions with a dedicated STS endpoint for FIPS or GovCloud traffic.
const STS_COMPLIANCE_ENDPOINTS: [(&str, &str); 6] = [
    ("us-east-1", "sts-fips.us-east-1.amazonaws.com"),
    ("us-east-2", "sts-fips.us-east-2.amazonaws.com"),
    ("us-west-1", "sts-fips.us-west-1.amazonaws.com"),
    ("us-west-2", "sts-fips.us-west-2.amazonaws.com"),
    ("us-gov-east-1", "sts.us-gov-east-1.amazonaws.com"),
    ("us-gov-west-1", "sts.us-gov-west-1.amazonaws.com"),
];

pub fn is_opt_in_region(region: &str) -> bool {
    OPT_IN_REGIONS.contains(&region)
}

pub fn is_govcloud_region(region: &str) -> bool {
    region.starts_with("us-gov-")
}

/// FIPS mode applies when the endpoint carries a FIPS marker or either the
/// endpoint or the region names a GovCloud partition.
pub fn requires_fips(endpoint: Option<&str>, region: Option<&str>) -> bool {
    let endpoint_flag = endpoint.is_some_and(|endpoint| {
        endpoint.contains("fips") || GOVCLOUD_REGIONS.iter().any(|gov| endpoint.contains(gov))
    });
    endpoint_flag || region.is_some_and(is_govcloud_region)
}

/// The FIPS or GovCloud STS endpoint for `region`, if one exists.
pub fn sts_compliance_endpoint(region: &str) -> Option<&'static str> {
    STS_COMPLIANCE_ENDPOINTS
        .iter()
        .find(|(candidate, _)| *candidate == region)
        .map(|(_, endpoint)| *endpoint)
}

fn host(endpoint: &str) -> &str {
    let without_scheme = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    without_scheme.split(['/', ':']).next().unwrap_or(without_scheme)
}

/// Whether `endpoint` already points at STS.
pub fn is_sts_endpoint(endpoint: &str) -> bool {
    let host = host(endpoint);
    host.starts_with("sts.") || host.starts_with("sts-fips.")
}

/// Endpoint handling for one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPlan {
    /// Whether clients should use FIPS endpoints.
    pub use_fips: bool,
    /// Endpoint for the STS call of an AssumeRole exchange.
    pub sts_endpoint: Option<String>,
}

impl EndpointPlan {
    /// Works out FIPS mode and the STS endpoint for the configured
    /// data-plane endpoint and region.
    ///
    /// A data-plane endpoint is never used for STS. When FIPS applies, the
    /// STS region is taken from the endpoint host if it names one of the
    /// compliance regions, otherwise from `region`.
    pub fn new(endpoint: Option<&str>, region: Option<&str>) -> Self {
        let use_fips = requires_fips(endpoint, region);

        let sts_endpoint = match endpoint {
            Some(endpoint) if is_sts_endpoint(endpoint) => Some(endpoint.to_owned()),
            _ if use_fips => {
                let from_endpoint = endpoint.and_then(|endpoint| {
                    let host = host(endpoint);
                    STS_COMPLIANCE_ENDPOINTS
                        .iter()
                        .find(|(candidate, _)| host_names_region(host, candidate))
                        .map(|(_, sts)| *sts)
                });
                from_endpoint
                    .or_else(|| region.and_then(sts_compliance_endpoint))
                    .map(str::to_owned)
            }
            _ => None,
        };

        Self {
            use_fips,
            sts_endpoint,
        }
    }
}

/// Matches `region` as a whole dot-delimited label of `host`.
fn host_names_region(host: &str, region: &str) -> bool {
    host.split('.').any(|label| label == region)
}
