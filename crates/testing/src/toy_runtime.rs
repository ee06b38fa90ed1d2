use std::{
    collections::{BTreeMap, HashSet},
    net::IpAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use ledgerbox_core::{
    ContainerId, ContainerRuntime, ContainerSummary, ImageRef, LaunchSpec, NetworkAttachment,
    PortMapping, PullProgress, RuntimeError, StartSignal,
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::TestFault;

pub const FIRST_EPHEMERAL_PORT: u16 = 32768;

/// Every call the toy runtime received, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    ImageExists(String),
    Pull(String),
    Create(String),
    Start(ContainerId),
    List(String),
    Stop(ContainerId),
    Remove(ContainerId, bool),
}

/// How published ports are reported back by the toy runtime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HostBinding {
    #[default]
    AllInterfaces,
    Loopback,
    Unpublished,
}

#[derive(Debug)]
struct ToyContainer {
    image: String,
    spec: LaunchSpec,
    running: bool,
    assigned: BTreeMap<u16, u16>,
    ip_address: String,
}

#[derive(Debug, Default)]
struct Inner {
    images: HashSet<String>,
    containers: BTreeMap<ContainerId, ToyContainer>,
    calls: Vec<Call>,
    next_id: u64,
    next_port: u16,
    binding: HostBinding,
    fault: TestFault,
}

/// In-memory container runtime.
///
/// Assigns ephemeral host ports at start time, the way a daemon does under
/// publish-all-ports, and records every request for later assertions.
#[derive(Clone, Debug, Default)]
pub struct ToyRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl ToyRuntime {
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.lock().next_port = FIRST_EPHEMERAL_PORT;
        runtime
    }

    pub fn with_fault(fault: TestFault) -> Self {
        let runtime = Self::new();
        runtime.set_fault(fault);
        runtime
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a poisoned lock only means another test thread panicked
        self.inner.lock().unwrap_or_else(|x| x.into_inner())
    }

    pub fn set_fault(&self, fault: TestFault) {
        self.lock().fault = fault;
    }

    pub fn set_binding(&self, binding: HostBinding) {
        self.lock().binding = binding;
    }

    pub fn preload_image(&self, image: &ImageRef) {
        self.lock().images.insert(image.to_string());
    }

    pub fn has_image(&self, image: &ImageRef) -> bool {
        self.lock().images.contains(&image.to_string())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|x| predicate(*x)).count()
    }

    /// Containers that exist, running or not
    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.lock().containers.keys().cloned().collect()
    }

    pub fn running_containers(&self) -> Vec<ContainerId> {
        self.lock()
            .containers
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn launch_spec(&self, id: &ContainerId) -> Option<LaunchSpec> {
        self.lock().containers.get(id).map(|c| c.spec.clone())
    }

    fn record(&self, call: Call) -> TestFault {
        let mut inner = self.lock();
        debug!(?call, "toy runtime call");
        inner.calls.push(call);
        inner.fault
    }
}

fn fault_err(what: &str) -> RuntimeError {
    RuntimeError::internal(format!("fault injection: {what}"))
}

fn summarize(id: &ContainerId, container: &ToyContainer, inner: &Inner) -> ContainerSummary {
    let host_ip: Option<IpAddr> = match inner.binding {
        HostBinding::AllInterfaces => Some(IpAddr::from([0, 0, 0, 0])),
        HostBinding::Loopback => Some(IpAddr::from([127, 0, 0, 1])),
        HostBinding::Unpublished => None,
    };

    let ports = container
        .spec
        .exposed_ports
        .iter()
        .map(|port| PortMapping {
            container_port: *port,
            host_port: match inner.binding {
                HostBinding::Unpublished => None,
                _ => container.assigned.get(port).copied(),
            },
            host_ip,
        })
        .collect();

    let networks = match inner.fault {
        TestFault::NoNetworks => vec![],
        _ => vec![NetworkAttachment {
            network: "bridge".into(),
            ip_address: Some(container.ip_address.clone()),
        }],
    };

    ContainerSummary {
        id: id.clone(),
        image: container.image.clone(),
        ports,
        networks,
    }
}

impl ContainerRuntime for ToyRuntime {
    async fn image_exists(&self, image: &ImageRef) -> Result<bool, RuntimeError> {
        if self.record(Call::ImageExists(image.to_string())) == TestFault::InspectImageError {
            return Err(fault_err("inspect image"));
        }

        Ok(self.has_image(image))
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<Vec<PullProgress>, RuntimeError> {
        if self.record(Call::Pull(image.to_string())) == TestFault::PullError {
            return Err(RuntimeError::ImageNotFound(image.to_string()));
        }

        self.lock().images.insert(image.to_string());

        Ok(vec![
            PullProgress {
                status: format!("Pulling from {}", image.name),
                detail: None,
            },
            PullProgress {
                status: format!("Status: Downloaded newer image for {image}"),
                detail: None,
            },
        ])
    }

    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerId, RuntimeError> {
        if self.record(Call::Create(spec.image.to_string())) == TestFault::CreateError {
            return Err(fault_err("create container"));
        }

        let mut inner = self.lock();

        if !inner.images.contains(&spec.image.to_string()) {
            return Err(RuntimeError::ImageNotFound(spec.image.to_string()));
        }

        inner.next_id += 1;
        let id = ContainerId(format!("toy{:08x}", inner.next_id));
        let ip_address = format!("172.17.0.{}", inner.next_id + 1);

        inner.containers.insert(
            id.clone(),
            ToyContainer {
                image: spec.image.to_string(),
                spec: spec.clone(),
                running: false,
                assigned: BTreeMap::new(),
                ip_address,
            },
        );

        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<StartSignal, RuntimeError> {
        let fault = self.record(Call::Start(id.clone()));

        if fault == TestFault::StartRejected {
            return Err(fault_err("start container"));
        }

        let (tx, rx) = oneshot::channel();

        let mut inner = self.lock();
        let mut next_port = inner.next_port;

        let container = inner
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.clone()))?;

        match fault {
            TestFault::ExitBeforeRunning => {
                let _ = tx.send(Err(RuntimeError::ExitedBeforeRunning(
                    "exit code 1".into(),
                )));
            }
            TestFault::DropStartSignal => drop(tx),
            _ => {
                if container.spec.publish_all_ports {
                    for port in container.spec.exposed_ports.iter() {
                        container.assigned.insert(*port, next_port);
                        next_port += 1;
                    }
                }

                container.running = true;
                let _ = tx.send(Ok(()));
            }
        }

        inner.next_port = next_port;

        Ok(rx)
    }

    async fn list_containers(
        &self,
        image: &ImageRef,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        if self.record(Call::List(image.to_string())) == TestFault::ListError {
            return Err(fault_err("list containers"));
        }

        let inner = self.lock();
        let image = image.to_string();

        let listed = inner
            .containers
            .iter()
            .filter(|(_, c)| c.running && c.image == image)
            .map(|(id, c)| summarize(id, c, &inner))
            .collect();

        Ok(listed)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout_secs: u64,
    ) -> Result<(), RuntimeError> {
        if self.record(Call::Stop(id.clone())) == TestFault::StopError {
            return Err(fault_err("stop container"));
        }

        let mut inner = self.lock();

        let container = inner
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.clone()))?;

        container.running = false;

        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), RuntimeError> {
        if self.record(Call::Remove(id.clone(), force)) == TestFault::RemoveError {
            return Err(fault_err("remove container"));
        }

        let mut inner = self.lock();

        match inner.containers.get(id) {
            None => Err(RuntimeError::ContainerNotFound(id.clone())),
            Some(c) if c.running && !force => Err(RuntimeError::internal(format!(
                "cannot remove running container {id}, stop it first or force"
            ))),
            Some(_) => {
                inner.containers.remove(id);
                Ok(())
            }
        }
    }
}
