use karpenter_api::{NodeClaim, NodePool};
use kube::CustomResourceExt;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/karpenter.sh_nodepools_crd.yaml",
        serde_yaml::to_string(&NodePool::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/karpenter.sh_nodeclaims_crd.yaml",
        serde_yaml::to_string(&NodeClaim::crd()).unwrap(),
    )
    .unwrap();
}
