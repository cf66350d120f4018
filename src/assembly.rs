use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InfraError, Result};
use crate::resources::SavedTemplate;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DEPLOY_FILE: &str = "deploy.sh";
pub const MANIFEST_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

impl FromStr for TemplateFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            x => Err(format!("Unknown template format '{x}'. Expected json or yaml")),
        }
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub stack_name: String,
    pub template: SavedTemplate,
    pub dependencies: Vec<String>,
}

impl SynthesizedStack {
    pub fn template_file(&self, format: TemplateFormat) -> String {
        format!("{}.template.{}", self.stack_name, format.extension())
    }

    pub fn render(&self, format: TemplateFormat) -> Result<String> {
        let out = match format {
            // pretty so that the template is readable in the cloudformation console
            TemplateFormat::Json => serde_json::to_string_pretty(&self.template)?,
            TemplateFormat::Yaml => serde_yaml::to_string(&self.template)?,
        };
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub stack_name: String,
    pub template_file: String,
    pub region: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// describes the synthesized stacks in deploy order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub stacks: Vec<ManifestEntry>,
}

/// the result of synthesizing an app: every stack's template, in deploy order.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    pub region: String,
    pub stacks: Vec<SynthesizedStack>,
}

impl CloudAssembly {
    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.stack_name.as_str()).collect()
    }

    pub fn get_stack(&self, name: &str) -> Result<&SynthesizedStack> {
        self.stacks
            .iter()
            .find(|s| s.stack_name == name)
            .ok_or_else(|| InfraError::UnknownStack(name.to_string()))
    }

    pub fn manifest(&self, format: TemplateFormat) -> Manifest {
        Manifest {
            version: MANIFEST_VERSION.to_string(),
            stacks: self.stacks.iter().map(|s| ManifestEntry {
                stack_name: s.stack_name.clone(),
                template_file: s.template_file(format),
                region: self.region.clone(),
                dependencies: s.dependencies.clone(),
            }).collect(),
        }
    }

    /// shell script that deploys every stack in order with the aws cli.
    pub fn deploy_script(&self, format: TemplateFormat) -> String {
        let region = &self.region;
        let mut out = String::new();
        out.push_str("#!/usr/bin/env bash\n\n");
        out.push_str("set -euo pipefail\n");
        out.push_str("cd \"$(dirname \"$0\")\"\n\n");
        out.push_str("# deploy:\n");
        for stack in self.stacks.iter() {
            let stack_name = &stack.stack_name;
            let template_file = stack.template_file(format);
            out.push_str(&format!(
                "AWS_REGION={region} aws --region {region} cloudformation deploy --stack-name {stack_name} --template-file ./{template_file} --capabilities CAPABILITY_NAMED_IAM\n"
            ));
        }
        out
    }

    /// writes templates, manifest and deploy script into `dir`, creating it
    /// if needed. Returns the paths written.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P, format: TemplateFormat) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| InfraError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut written = vec![];
        for stack in self.stacks.iter() {
            let path = dir.join(stack.template_file(format));
            write_file(&path, &stack.render(format)?)?;
            written.push(path);
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = serde_json::to_string_pretty(&self.manifest(format))?;
        write_file(&manifest_path, &manifest)?;
        written.push(manifest_path);

        let deploy_path = dir.join(DEPLOY_FILE);
        write_file(&deploy_path, &self.deploy_script(format))?;
        make_executable(&deploy_path)?;
        written.push(deploy_path);

        for path in written.iter() {
            tracing::info!(path = %path.display(), "wrote file");
        }
        Ok(written)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| InfraError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|source| InfraError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
