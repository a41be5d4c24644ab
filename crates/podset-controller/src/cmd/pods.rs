use anyhow::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use utils::logging;

use crate::config::PodsArgs;
use crate::domain::reconciler::instance;
use crate::domain::reconciler::ObjectKey;
use crate::domain::reconciler::PodPhase;
use crate::domain::reconciler::ResourceStore;
use crate::infrastructure::k8s::KubeStore;
use crate::infrastructure::kube_client;

/// Lists the pods selected by a PodSet with their phase and whether they count as active.
pub async fn list_pods(pods_args: PodsArgs) -> Result<()> {
    let _guard = logging::init(None::<&std::path::Path>);

    let client = kube_client::init_kube_client(pods_args.kubeconfig.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;
    let namespace = kube_client::namespace_or_default(&client, pods_args.namespace.clone());
    let store = KubeStore::new(client);

    let key = ObjectKey::new(namespace.clone(), pods_args.name.clone());
    match store
        .get_pod_set(&key)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to fetch PodSet {key}: {e:?}"))?
    {
        Some(pod_set) => {
            let status = pod_set.observed_status();
            println!(
                "PodSet {key}: desired {}, current {}",
                pod_set.desired_replicas(),
                status.replicas
            );
        }
        None => println!("PodSet {key} not found, listing pods by label"),
    }

    let pods = store
        .list_pods(&namespace, &api_types::instance_labels(&pods_args.name))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list pods of PodSet {key}: {e:?}"))?;

    for line in render_pods(&pods) {
        println!("{line}");
    }
    Ok(())
}

fn render_pods(pods: &[Pod]) -> Vec<String> {
    let width = pods
        .iter()
        .map(|pod| pod.name_any().len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut lines = vec![format!("{:<width$}  {:<9}  ACTIVE", "NAME", "PHASE")];
    lines.extend(pods.iter().map(|pod| {
        format!(
            "{:<width$}  {:<9}  {}",
            pod.name_any(),
            PodPhase::of(pod).to_string(),
            if instance::is_active(pod) { "yes" } else { "no" },
        )
    }));
    lines
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;

    fn pod(name: &str, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn renders_phase_and_activity() {
        let lines = render_pods(&[pod("web-pod1", "Running"), pod("web-pod22", "Succeeded")]);
        assert_eq!(
            lines,
            vec![
                "NAME       PHASE      ACTIVE".to_string(),
                "web-pod1   Running    yes".to_string(),
                "web-pod22  Succeeded  no".to_string(),
            ]
        );
    }
}
