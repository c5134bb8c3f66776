use serde::{Deserialize, Serialize};

/// A single version of a Terraform module.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    /// SemVer version string without a leading 'v'.
    pub version: String,
    /// Address Terraform fetches the module source from.
    /// https://developer.hashicorp.com/terraform/language/modules/sources
    pub source_url: String,
}

/// Response shape for the provider "List Available Versions" operation.
/// https://developer.hashicorp.com/terraform/internals/provider-registry-protocol#list-available-versions
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderVersions {
    pub versions: Vec<ProviderVersion>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderVersion {
    pub version: String,
    pub protocols: Vec<String>,
    pub platforms: Vec<Platform>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

/// Per-platform package descriptor returned by the provider download
/// operation.
/// https://developer.hashicorp.com/terraform/internals/provider-registry-protocol#find-a-provider-package
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderPackage {
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub signing_keys: SigningKeys,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningKeys {
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct GpgPublicKey {
    pub key_id: String,
    pub ascii_armor: String,
    pub trust_signature: String,
    pub source: String,
    pub source_url: String,
}

/// The `terraform-registry-manifest.json` file publishers attach to a
/// release. Only `metadata.protocol_versions` is consumed.
/// https://developer.hashicorp.com/terraform/registry/providers/publishing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProviderManifest {
    pub metadata: ProviderManifestMetadata,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProviderManifestMetadata {
    pub protocol_versions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_package_serializes_all_fields() {
        let package = ProviderPackage {
            protocols: vec!["5.0".to_string()],
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            filename: "terraform-provider-test_1.0.0_linux_amd64.zip".to_string(),
            download_url: "https://example.com/download".to_string(),
            shasums_url: "https://example.com/shasums".to_string(),
            shasums_signature_url: "https://example.com/shasums.sig".to_string(),
            shasum: "abc123".to_string(),
            signing_keys: SigningKeys {
                gpg_public_keys: vec![GpgPublicKey {
                    key_id: "ABCD1234EFGH5678".to_string(),
                    ascii_armor: "-----BEGIN PGP PUBLIC KEY BLOCK-----".to_string(),
                    ..Default::default()
                }],
            },
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&package).unwrap()).unwrap();
        assert_eq!(json["protocols"][0], "5.0");
        assert_eq!(json["os"], "linux");
        assert_eq!(json["arch"], "amd64");
        assert_eq!(json["shasum"], "abc123");
        assert_eq!(json["signing_keys"]["gpg_public_keys"][0]["key_id"], "ABCD1234EFGH5678");
        assert_eq!(json["signing_keys"]["gpg_public_keys"][0]["trust_signature"], "");
    }

    #[test]
    fn provider_manifest_parses_protocol_versions() {
        let manifest: ProviderManifest = serde_json::from_value(serde_json::json!({
            "version": 1,
            "metadata": { "protocol_versions": ["6.0"] }
        }))
        .unwrap();
        assert_eq!(manifest.metadata.protocol_versions, vec!["6.0"]);
    }

    #[test]
    fn provider_versions_round_trips() {
        let versions = ProviderVersions {
            versions: vec![ProviderVersion {
                version: "1.0.0".to_string(),
                protocols: vec!["5.0".to_string()],
                platforms: vec![Platform {
                    os: "linux".to_string(),
                    arch: "amd64".to_string(),
                }],
            }],
        };

        let json = serde_json::to_string(&versions).unwrap();
        assert_eq!(
            json,
            r#"{"versions":[{"version":"1.0.0","protocols":["5.0"],"platforms":[{"os":"linux","arch":"amd64"}]}]}"#
        );
    }
}
