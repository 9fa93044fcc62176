//! Prints the ZookeeperCluster CRD as YAML for the deployment manifests.

use crds::ZookeeperCluster;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ZookeeperCluster::crd())?);
    Ok(())
}
