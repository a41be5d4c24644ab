use anyhow::Context;
use anyhow::Result;
use api_types::PodSet;
use kube::CustomResourceExt;

/// Renders the PodSet CRD as a YAML document.
pub fn crd_yaml() -> Result<String> {
    serde_yaml::to_string(&PodSet::crd()).context("serialize PodSet CRD failed")
}

pub fn print_crd() -> Result<()> {
    print!("{}", crd_yaml()?);
    Ok(())
}
