use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use ethers::{
    abi::{
        token::{LenientTokenizer, Tokenizer},
        Abi,
        ParamType,
        Token,
    },
    types::{Address, Bytes},
};
use provision_config::settings::ArtifactSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DeployError, ProvisionError};

pub const USDC: &str = "TokenUSDC";
pub const USDT: &str = "TokenUSDT";
pub const DAI: &str = "TokenDAI";
pub const POOL: &str = "LiquidityPool";

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact {name} is unusable: {reason}")]
    Artifact { name: String, reason: String },
    #[error("plan has no contracts")]
    Empty,
    #[error("contract {0} is declared twice")]
    DuplicateName(String),
    #[error("{artifact} references unknown contract {reference}")]
    UnknownReference { artifact: String, reference: String },
    #[error("dependency cycle between {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// A constructor argument, either fixed or the address of a contract
/// deployed earlier in the same run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConstructorArg {
    /// Parsed against the ABI input type, e.g. `"1000000"` for a `uint256`.
    Literal(String),
    AddressOf(String),
}

/// Compiled contract ready for deployment.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub bytecode: Bytes,
    pub abi: Abi,
    pub constructor_args: Vec<ConstructorArg>,
}

impl ContractArtifact {
    pub fn new(
        name: impl Into<String>,
        bytecode: Bytes,
        abi: Abi,
        constructor_args: Vec<ConstructorArg>,
    ) -> Self {
        Self {
            name: name.into(),
            bytecode,
            abi,
            constructor_args,
        }
    }

    /// Parses compiler output: `abi` plus `bytecode` as a hex string
    /// (hardhat) or as `{ "object": ... }` (forge).
    pub fn from_json(
        name: impl Into<String>,
        json: &serde_json::Value,
        constructor_args: Vec<ConstructorArg>,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        let invalid = |reason: String| {
            PlanError::Artifact {
                name: name.clone(),
                reason,
            }
        };

        let abi: Abi = serde_json::from_value(json["abi"].clone())
            .map_err(|e| invalid(format!("bad abi: {e}")))?;

        let bytecode = json["bytecode"]
            .as_str()
            .or_else(|| json["bytecode"]["object"].as_str())
            .ok_or_else(|| invalid("no bytecode".into()))?;
        let bytecode: Bytes = bytecode
            .parse()
            .map_err(|e| invalid(format!("bytecode is not hex, unlinked library? {e}")))?;
        if bytecode.is_empty() {
            return Err(invalid("empty bytecode, abstract contract or interface".into()));
        }

        Ok(Self::new(name, bytecode, abi, constructor_args))
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.constructor_args.iter().filter_map(|arg| {
            match arg {
                ConstructorArg::AddressOf(name) => Some(name.as_str()),
                ConstructorArg::Literal(_) => None,
            }
        })
    }

    pub fn is_independent(&self) -> bool {
        self.dependencies().next().is_none()
    }

    /// Creation transaction input: bytecode followed by the ABI encoded
    /// constructor arguments, with references resolved against `addresses`.
    pub fn creation_data(
        &self,
        addresses: &BTreeMap<String, Address>,
    ) -> Result<Bytes, ProvisionError> {
        enum Resolved<'a> {
            Literal(&'a str),
            Address(Address),
        }

        let mut resolved = Vec::with_capacity(self.constructor_args.len());
        for arg in &self.constructor_args {
            match arg {
                ConstructorArg::Literal(value) => resolved.push(Resolved::Literal(value)),
                ConstructorArg::AddressOf(dependency) => {
                    let address = addresses.get(dependency).ok_or_else(|| {
                        ProvisionError::DependencyUnresolved {
                            artifact: self.name.clone(),
                            dependency: dependency.clone(),
                        }
                    })?;
                    resolved.push(Resolved::Address(*address));
                }
            }
        }

        let encode_err =
            |reason: String| ProvisionError::deploy(&self.name, DeployError::Encode(reason));

        let Some(constructor) = self.abi.constructor() else {
            if resolved.is_empty() {
                return Ok(self.bytecode.clone());
            }
            return Err(encode_err(format!(
                "abi has no constructor but {} arguments were given",
                resolved.len()
            )));
        };

        if constructor.inputs.len() != resolved.len() {
            return Err(encode_err(format!(
                "constructor takes {} arguments, {} given",
                constructor.inputs.len(),
                resolved.len()
            )));
        }

        let tokens = constructor
            .inputs
            .iter()
            .zip(resolved)
            .map(|(param, arg)| {
                match arg {
                    Resolved::Address(address) if param.kind == ParamType::Address => {
                        Ok(Token::Address(address))
                    }
                    Resolved::Address(_) => {
                        Err(encode_err(format!(
                            "{} is {}, cannot pass a contract address",
                            param.name, param.kind
                        )))
                    }
                    Resolved::Literal(value) => {
                        LenientTokenizer::tokenize(&param.kind, value).map_err(|e| {
                            encode_err(format!("{} ({}): {e}", param.name, param.kind))
                        })
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        constructor
            .encode_input(self.bytecode.to_vec(), &tokens)
            .map(Bytes::from)
            .map_err(|e| encode_err(e.to_string()))
    }
}

/// Artifacts in execution order: independents in declaration order, then
/// dependents topologically sorted (ties broken by declaration order).
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    artifacts: Vec<ContractArtifact>,
    independents: Vec<usize>,
    dependents: Vec<usize>,
}

impl DeploymentPlan {
    pub fn new(artifacts: Vec<ContractArtifact>) -> Result<Self, PlanError> {
        if artifacts.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut names = HashSet::new();
        for artifact in &artifacts {
            if !names.insert(artifact.name.as_str()) {
                return Err(PlanError::DuplicateName(artifact.name.clone()));
            }
        }
        for artifact in &artifacts {
            for dependency in artifact.dependencies() {
                if !names.contains(dependency) {
                    return Err(PlanError::UnknownReference {
                        artifact: artifact.name.clone(),
                        reference: dependency.to_string(),
                    });
                }
            }
        }

        let independents: Vec<usize> = (0..artifacts.len())
            .filter(|&i| artifacts[i].is_independent())
            .collect();

        let mut placed: HashSet<&str> = independents
            .iter()
            .map(|&i| artifacts[i].name.as_str())
            .collect();
        let mut remaining: Vec<usize> = (0..artifacts.len())
            .filter(|&i| !artifacts[i].is_independent())
            .collect();
        let mut dependents = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .position(|&i| artifacts[i].dependencies().all(|d| placed.contains(d)));
            let Some(pos) = ready else {
                return Err(PlanError::Cycle(
                    remaining.iter().map(|&i| artifacts[i].name.clone()).collect(),
                ));
            };
            let index = remaining.remove(pos);
            placed.insert(artifacts[index].name.as_str());
            dependents.push(index);
        }

        Ok(Self {
            artifacts,
            independents,
            dependents,
        })
    }

    pub fn independents(&self) -> impl Iterator<Item = &ContractArtifact> {
        self.independents.iter().map(|&i| &self.artifacts[i])
    }

    pub fn dependents(&self) -> impl Iterator<Item = &ContractArtifact> {
        self.dependents.iter().map(|&i| &self.artifacts[i])
    }

    /// Every artifact name, in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.independents()
            .chain(self.dependents())
            .map(|a| a.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// One contract in a plan file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub name: String,
    /// Artifact file stem, defaults to `name`.
    #[serde(default)]
    pub artifact: Option<String>,
    #[serde(default)]
    pub constructor_args: Vec<ConstructorArg>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanFile {
    pub contracts: Vec<PlanEntry>,
}

impl PlanFile {
    /// Three tokens and a pool constructed with their addresses.
    pub fn standard() -> Self {
        let token = |name: &str| {
            PlanEntry {
                name: name.to_string(),
                artifact: None,
                constructor_args: Vec::new(),
            }
        };
        Self {
            contracts: vec![
                token(USDC),
                token(USDT),
                token(DAI),
                PlanEntry {
                    name: POOL.to_string(),
                    artifact: None,
                    constructor_args: [USDC, USDT, DAI]
                        .iter()
                        .map(|t| ConstructorArg::AddressOf(t.to_string()))
                        .collect(),
                },
            ],
        }
    }
}

/// Reads compiler output from a directory with either a flat layout
/// (`<dir>/<Name>.json`) or forge's (`<dir>/<Name>.sol/<Name>.json`).
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    dir: PathBuf,
}

impl ArtifactLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, artifact: &str) -> PathBuf {
        let flat = self.dir.join(format!("{artifact}.json"));
        if flat.exists() {
            return flat;
        }
        self.dir
            .join(format!("{artifact}.sol"))
            .join(format!("{artifact}.json"))
    }

    pub async fn load(&self, entry: &PlanEntry) -> Result<ContractArtifact, PlanError> {
        let stem = entry.artifact.as_deref().unwrap_or(&entry.name);
        let path = self.path_for(stem);
        let json = read_json(&path).await?;
        debug!(name = %entry.name, path = %path.display(), "loaded artifact");
        ContractArtifact::from_json(&entry.name, &json, entry.constructor_args.clone())
    }

    pub async fn load_plan(&self, file: &PlanFile) -> Result<DeploymentPlan, PlanError> {
        let mut artifacts = Vec::with_capacity(file.contracts.len());
        for entry in &file.contracts {
            artifacts.push(self.load(entry).await?);
        }
        DeploymentPlan::new(artifacts)
    }

    /// The plan named in settings, or the standard plan, loaded from the
    /// configured artifacts directory.
    pub async fn from_settings(settings: &ArtifactSettings) -> Result<DeploymentPlan, PlanError> {
        let file = match &settings.plan {
            Some(path) => {
                let json = read_json(path).await?;
                serde_json::from_value(json).map_err(|source| {
                    PlanError::Json {
                        path: path.clone(),
                        source,
                    }
                })?
            }
            None => PlanFile::standard(),
        };
        let plan = Self::new(&settings.dir).load_plan(&file).await?;
        info!(contracts = ?plan.names(), "deployment plan ready");
        Ok(plan)
    }
}

async fn read_json(path: &Path) -> Result<serde_json::Value, PlanError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| {
        PlanError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|source| {
        PlanError::Json {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{pool_abi, standard_plan};

    fn bare(name: &str, args: Vec<ConstructorArg>) -> ContractArtifact {
        ContractArtifact::new(name, Bytes::from(vec![0x60, 0x80]), Abi::default(), args)
    }

    fn address_of(name: &str) -> ConstructorArg {
        ConstructorArg::AddressOf(name.to_string())
    }

    #[test]
    fn standard_plan_orders_tokens_before_pool() {
        let plan = standard_plan();
        let independents: Vec<_> = plan.independents().map(|a| a.name.as_str()).collect();
        let dependents: Vec<_> = plan.dependents().map(|a| a.name.as_str()).collect();
        assert_eq!(independents, vec![USDC, USDT, DAI]);
        assert_eq!(dependents, vec![POOL]);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn dependents_are_topologically_sorted() {
        let plan = DeploymentPlan::new(vec![
            bare("Router", vec![address_of("Pool")]),
            bare("Token", vec![]),
            bare("Pool", vec![address_of("Token")]),
        ])
        .unwrap();
        assert_eq!(plan.names(), vec!["Token", "Pool", "Router"]);
    }

    #[test]
    fn rejects_invalid_plans() {
        assert!(matches!(DeploymentPlan::new(vec![]), Err(PlanError::Empty)));
        assert!(matches!(
            DeploymentPlan::new(vec![bare("A", vec![]), bare("A", vec![])]),
            Err(PlanError::DuplicateName(n)) if n == "A"
        ));
        assert!(matches!(
            DeploymentPlan::new(vec![bare("A", vec![address_of("Missing")])]),
            Err(PlanError::UnknownReference { reference, .. }) if reference == "Missing"
        ));
        assert!(matches!(
            DeploymentPlan::new(vec![
                bare("T", vec![]),
                bare("A", vec![address_of("B")]),
                bare("B", vec![address_of("A")]),
            ]),
            Err(PlanError::Cycle(names)) if names == vec!["A", "B"]
        ));
        assert!(matches!(
            DeploymentPlan::new(vec![bare("A", vec![address_of("A")])]),
            Err(PlanError::Cycle(_))
        ));
    }

    #[test]
    fn creation_data_appends_resolved_addresses() {
        let plan = standard_plan();
        let pool = plan.dependents().next().unwrap();

        let addresses: BTreeMap<String, Address> = [USDC, USDT, DAI]
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), Address::from_low_u64_be(i as u64 + 1)))
            .collect();

        let data = pool.creation_data(&addresses).unwrap();
        assert_eq!(data.len(), 5 + 3 * 32);
        assert_eq!(&data[..5], &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(data[5 + 31], 1);
        assert_eq!(data[5 + 63], 2);
        assert_eq!(data[5 + 95], 3);
    }

    #[test]
    fn missing_dependency_is_reported() {
        let plan = standard_plan();
        let pool = plan.dependents().next().unwrap();
        let addresses = BTreeMap::from([(USDC.to_string(), Address::zero())]);

        let err = pool.creation_data(&addresses).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::DependencyUnresolved { ref dependency, .. } if dependency == USDT
        ));
    }

    #[test]
    fn literals_are_tokenized_against_the_abi() {
        let abi = json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                {"name": "name", "type": "string"},
                {"name": "decimals", "type": "uint8"},
                {"name": "supply", "type": "uint256"}
            ]
        }]);
        let artifact = ContractArtifact::from_json(
            USDC,
            &json!({"abi": abi, "bytecode": {"object": "0x00"}}),
            vec![
                ConstructorArg::Literal("USD Coin".into()),
                ConstructorArg::Literal("6".into()),
                ConstructorArg::Literal("1000000000000".into()),
            ],
        )
        .unwrap();
        let data = artifact.creation_data(&BTreeMap::new()).unwrap();
        // head (3 words) + string length + string body
        assert_eq!(data.len(), 1 + 5 * 32);

        let bad = ContractArtifact {
            constructor_args: vec![
                ConstructorArg::Literal("USD Coin".into()),
                ConstructorArg::Literal("six".into()),
                ConstructorArg::Literal("1".into()),
            ],
            ..artifact
        };
        let err = bad.creation_data(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Deploy {
                source: DeployError::Encode(_),
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_bytecode() {
        let err =
            ContractArtifact::from_json("IToken", &json!({"abi": [], "bytecode": "0x"}), vec![])
                .unwrap_err();
        assert!(matches!(err, PlanError::Artifact { .. }));
    }

    #[tokio::test]
    async fn loads_flat_and_forge_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let token = json!({"abi": [], "bytecode": "0x6080"}).to_string();
        for name in [USDC, USDT] {
            std::fs::write(dir.path().join(format!("{name}.json")), &token).unwrap();
        }
        let forge_dir = dir.path().join(format!("{DAI}.sol"));
        std::fs::create_dir_all(&forge_dir).unwrap();
        std::fs::write(
            forge_dir.join(format!("{DAI}.json")),
            json!({"abi": [], "bytecode": {"object": "0x6080"}}).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(format!("{POOL}.json")),
            json!({"abi": pool_abi(), "bytecode": "0x6080"}).to_string(),
        )
        .unwrap();

        let settings = ArtifactSettings {
            dir: dir.path().to_path_buf(),
            plan: None,
        };
        let plan = ArtifactLoader::from_settings(&settings).await.unwrap();
        assert_eq!(plan.names(), vec![USDC, USDT, DAI, POOL]);
    }

    #[tokio::test]
    async fn missing_artifact_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ArtifactSettings {
            dir: dir.path().to_path_buf(),
            plan: None,
        };
        let err = ArtifactLoader::from_settings(&settings).await.unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }

    #[tokio::test]
    async fn plan_file_overrides_standard_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Vault.json"),
            json!({"abi": [], "bytecode": "0x6080"}).to_string(),
        )
        .unwrap();
        let plan_path = dir.path().join("plan.json");
        std::fs::write(
            &plan_path,
            json!({"contracts": [
                {"name": "VaultA", "artifact": "Vault"},
                {"name": "VaultB", "artifact": "Vault"}
            ]})
            .to_string(),
        )
        .unwrap();

        let settings = ArtifactSettings {
            dir: dir.path().to_path_buf(),
            plan: Some(plan_path),
        };
        let plan = ArtifactLoader::from_settings(&settings).await.unwrap();
        assert_eq!(plan.names(), vec!["VaultA", "VaultB"]);
    }
}
