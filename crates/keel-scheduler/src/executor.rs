//! Executor selection: reuse the running executor of a pod instance, or
//! synthesize a new descriptor from the pod specification.

use keel_core::taskdata::LabelReader;
use keel_core::{
    CommandInfo, CommandUri, ContainerInfo, DockerImage, ExecutorInfo, IpAddress, IpProtocol,
    NetworkInfo, NetworkSpec, PodInstance, PodSpec, PortMapping, RLimit, RLimitInfo, RLimitSpec,
    SchedulerFlags, TaskInfo,
};
use keel_state::TaskStore;
use tracing::{debug, info, warn};

use crate::error::SchedulerResult;
use crate::task::CONFIG_TEMPLATE_DOWNLOAD_DIR;

/// Locates the bundled native library and runtime, then starts the
/// executor helper shipped in the sandbox.
pub const EXECUTOR_BOOTSTRAP_COMMAND: &str = concat!(
    "export LD_LIBRARY_PATH=$MESOS_SANDBOX/libmesos-bundle/lib:$LD_LIBRARY_PATH && ",
    "export MESOS_NATIVE_JAVA_LIBRARY=$(ls $MESOS_SANDBOX/libmesos-bundle/lib/libmesos-*.so) && ",
    "export JAVA_HOME=$(ls -d $MESOS_SANDBOX/jre*/) && ",
    "$MESOS_SANDBOX/executor/bin/executor",
);

/// Persisted tasks belonging to the pod instance, judged by their type and
/// index labels. Tasks whose labels cannot be read are skipped.
pub fn pod_tasks<S: TaskStore>(store: &S, pod_instance: &PodInstance) -> SchedulerResult<Vec<TaskInfo>> {
    let tasks = store
        .fetch_tasks()?
        .into_iter()
        .filter(|task| is_same_pod_instance(task, pod_instance))
        .collect();
    Ok(tasks)
}

fn is_same_pod_instance(task: &TaskInfo, pod_instance: &PodInstance) -> bool {
    let labels = LabelReader::new(task);
    match (labels.pod_type(), labels.index()) {
        (Ok(pod_type), Ok(index)) => {
            pod_type == pod_instance.pod.pod_type && index == pod_instance.index
        }
        (Err(e), _) | (_, Err(e)) => {
            debug!(task = %task.name, error = %e, "skipping task with unreadable labels");
            false
        }
    }
}

/// The executor of the first running task of the pod instance, if any.
pub fn running_executor<S: TaskStore>(
    store: &S,
    pod_instance: &PodInstance,
) -> SchedulerResult<Option<ExecutorInfo>> {
    for task in pod_tasks(store, pod_instance)? {
        let running = store
            .fetch_status(&task.name)?
            .is_some_and(|status| status.state.is_running());
        if !running {
            continue;
        }

        let executor = match task.executor {
            Some(executor) => Some(executor),
            None => store.fetch_executor(&pod_instance.name())?,
        };
        match executor {
            Some(executor) => {
                info!(
                    task = %task.name,
                    executor_id = %executor.executor_id,
                    "reusing executor of running task"
                );
                return Ok(Some(executor));
            }
            None => warn!(task = %task.name, "running task has no recorded executor"),
        }
    }
    Ok(None)
}

/// A fresh executor descriptor for the pod. Its id stays empty until an
/// offer is matched.
pub fn new_executor(service_name: &str, flags: &SchedulerFlags, pod: &PodSpec) -> ExecutorInfo {
    let mut uris = vec![
        CommandUri::new(flags.libmesos_uri.as_str()),
        CommandUri::new(flags.java_uri.as_str()),
    ];
    uris.extend(pod.uris.iter().map(|uri| CommandUri::new(uri.as_str())));

    for task in &pod.tasks {
        for config in &task.config_files {
            uris.push(CommandUri {
                value: template_url(service_name, flags, &pod.pod_type, &task.name, &config.name),
                output_file: Some(format!("{CONFIG_TEMPLATE_DOWNLOAD_DIR}{}", config.name)),
                extract: false,
            });
        }
    }

    ExecutorInfo {
        name: pod.pod_type.clone(),
        executor_id: String::new(),
        command: CommandInfo {
            value: EXECUTOR_BOOTSTRAP_COMMAND.to_string(),
            environment: Default::default(),
            uris,
            user: pod.user.clone(),
        },
        container: container_info(pod),
    }
}

/// Artifact API location of one config template.
pub fn template_url(
    service_name: &str,
    flags: &SchedulerFlags,
    pod_type: &str,
    task_name: &str,
    template: &str,
) -> String {
    format!(
        "http://{service_name}.{}:{}/v1/artifacts/template/{}/{pod_type}/{task_name}/{template}",
        flags.api_domain, flags.api_port, flags.target_config_id
    )
}

fn container_info(pod: &PodSpec) -> Option<ContainerInfo> {
    if pod.image.is_none() && pod.networks.is_empty() && pod.rlimits.is_empty() {
        return None;
    }
    Some(ContainerInfo {
        image: pod.image.as_ref().map(|name| DockerImage { name: name.clone() }),
        network_infos: pod.networks.iter().map(network_info).collect(),
        rlimit_info: (!pod.rlimits.is_empty()).then(|| RLimitInfo {
            rlimits: pod.rlimits.iter().map(rlimit).collect(),
        }),
    })
}

fn network_info(spec: &NetworkSpec) -> NetworkInfo {
    debug!(network = %spec.name, "adding network");
    NetworkInfo {
        name: spec.name.clone(),
        port_mappings: spec
            .port_mappings
            .iter()
            .map(|(host_port, container_port)| PortMapping {
                host_port: *host_port,
                container_port: *container_port,
            })
            .collect(),
        groups: spec.netgroups.clone(),
        ip_addresses: spec
            .ip_addresses
            .iter()
            .map(|ip| IpAddress {
                ip_address: ip.clone(),
                protocol: IpProtocol::Ipv4,
            })
            .collect(),
    }
}

/// Limits are set only when both soft and hard values are given.
fn rlimit(spec: &RLimitSpec) -> RLimit {
    let (soft, hard) = match (spec.soft, spec.hard) {
        (Some(soft), Some(hard)) => (Some(soft), Some(hard)),
        _ => (None, None),
    };
    RLimit {
        kind: spec.name.clone(),
        soft,
        hard,
    }
}
