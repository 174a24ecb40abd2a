//! Region-to-control-plane endpoint resolution.
//!
//! Resolution is a pure, total function: every region string maps to exactly
//! one [`Endpoint`], with unrecognised regions falling through to the
//! standard commercial partition.

use crate::fetch::transport::TrustBundle;
use camino::Utf8PathBuf;
use std::fmt;

/// Region prefix shared by the isolated partitions.
const ISOLATED_REGION_PREFIX: &str = "us-iso";

/// The AWS partition a region belongs to, as far as endpoint naming goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Commercial regions; also the fallback for anything unrecognised.
    Standard,
    /// The China partition, served from an `.org.cn` suffix.
    China,
    /// The `us-iso-east-1` isolated partition.
    Iso,
    /// The `us-isob-east-1` isolated partition.
    IsoB,
}

impl Partition {
    /// Returns the partition for `region`.
    #[must_use]
    pub fn for_region(region: &str) -> Self {
        match region {
            "us-iso-east-1" => Self::Iso,
            "us-isob-east-1" => Self::IsoB,
            "cn-north-1" | "cn-northwest-1" => Self::China,
            _ => Self::Standard,
        }
    }

    fn base_url(self, region: &str) -> String {
        match self {
            Self::Iso => format!("https://chronicle-control-prod.{region}.c2s.ic.gov"),
            Self::IsoB => format!("https://chronicle-control-prod.{region}.sc2s.sgov.gov"),
            Self::China => {
                format!("https://control.prod.{region}.chronicle.security.aws.a2z.org.cn")
            }
            Self::Standard => {
                format!("https://control.prod.{region}.chronicle.security.aws.a2z.com")
            }
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "aws",
            Self::China => "aws-cn",
            Self::Iso => "aws-iso",
            Self::IsoB => "aws-iso-b",
        };
        f.write_str(name)
    }
}

/// The control-plane endpoint for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    region: String,
    partition: Partition,
    base_url: String,
    trust: TrustBundle,
}

impl Endpoint {
    /// Returns the region this endpoint was resolved from.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the partition the region belongs to.
    #[must_use]
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the certificate trust used for both control-plane and
    /// download requests in this region.
    #[must_use]
    pub fn trust(&self) -> &TrustBundle {
        &self.trust
    }

    /// Returns the URL that issues a presigned location for `component`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronicle_installer::endpoint::EndpointResolver;
    ///
    /// let endpoint = EndpointResolver.resolve("eu-west-1");
    /// assert_eq!(
    ///     endpoint.rpm_url("x86_64"),
    ///     "https://control.prod.eu-west-1.chronicle.security.aws.a2z.com/rpm/x86_64"
    /// );
    /// ```
    #[must_use]
    pub fn rpm_url(&self, component: &str) -> String {
        format!("{}/rpm/{component}", self.base_url)
    }
}

/// Maps region identifiers to control-plane endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointResolver;

impl EndpointResolver {
    /// Resolves `region` to its endpoint.
    ///
    /// Regions in the isolated partitions use the region's local CA bundle at
    /// `/etc/pki/{region}/certs/ca-bundle.pem`; all other regions use the
    /// system trust store.
    #[must_use]
    pub fn resolve(&self, region: &str) -> Endpoint {
        let partition = Partition::for_region(region);
        let trust = if region.starts_with(ISOLATED_REGION_PREFIX) {
            TrustBundle::Custom(Utf8PathBuf::from(format!(
                "/etc/pki/{region}/certs/ca-bundle.pem"
            )))
        } else {
            TrustBundle::SystemDefault
        };
        Endpoint {
            region: region.to_owned(),
            partition,
            base_url: partition.base_url(region),
            trust,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::iso(
        "us-iso-east-1",
        Partition::Iso,
        "https://chronicle-control-prod.us-iso-east-1.c2s.ic.gov"
    )]
    #[case::isob(
        "us-isob-east-1",
        Partition::IsoB,
        "https://chronicle-control-prod.us-isob-east-1.sc2s.sgov.gov"
    )]
    #[case::beijing(
        "cn-north-1",
        Partition::China,
        "https://control.prod.cn-north-1.chronicle.security.aws.a2z.org.cn"
    )]
    #[case::ningxia(
        "cn-northwest-1",
        Partition::China,
        "https://control.prod.cn-northwest-1.chronicle.security.aws.a2z.org.cn"
    )]
    #[case::virginia(
        "us-east-1",
        Partition::Standard,
        "https://control.prod.us-east-1.chronicle.security.aws.a2z.com"
    )]
    fn resolves_known_regions(
        #[case] region: &str,
        #[case] partition: Partition,
        #[case] base_url: &str,
    ) {
        let endpoint = EndpointResolver.resolve(region);
        assert_eq!(endpoint.partition(), partition);
        assert_eq!(endpoint.base_url(), base_url);
        assert_eq!(endpoint.region(), region);
    }

    #[rstest]
    #[case::unknown("mars-central-7")]
    #[case::empty("")]
    #[case::unlisted_china("cn-south-9")]
    fn unrecognised_regions_use_the_standard_partition(#[case] region: &str) {
        let endpoint = EndpointResolver.resolve(region);
        assert_eq!(endpoint.partition(), Partition::Standard);
        assert_eq!(
            endpoint.base_url(),
            format!("https://control.prod.{region}.chronicle.security.aws.a2z.com")
        );
        assert_eq!(endpoint.trust(), &TrustBundle::SystemDefault);
    }

    #[rstest]
    #[case("us-iso-east-1")]
    #[case("us-isob-east-1")]
    fn isolated_regions_use_the_local_ca_bundle(#[case] region: &str) {
        let endpoint = EndpointResolver.resolve(region);
        assert_eq!(
            endpoint.trust(),
            &TrustBundle::Custom(Utf8PathBuf::from(format!(
                "/etc/pki/{region}/certs/ca-bundle.pem"
            )))
        );
    }

    #[test]
    fn future_isolated_regions_still_get_a_custom_bundle() {
        let endpoint = EndpointResolver.resolve("us-iso-west-1");
        assert_eq!(endpoint.partition(), Partition::Standard);
        assert!(matches!(endpoint.trust(), TrustBundle::Custom(_)));
    }

    #[test]
    fn rpm_url_appends_component() {
        let endpoint = EndpointResolver.resolve("cn-north-1");
        assert_eq!(
            endpoint.rpm_url("chronicled-2.0.1228.0-1_naws.aarch64.rpm"),
            "https://control.prod.cn-north-1.chronicle.security.aws.a2z.org.cn/rpm/chronicled-2.0.1228.0-1_naws.aarch64.rpm"
        );
    }
}
