//! Modbus TCP front end over the shared register map
//!
//! The server only touches the register map; devices never see a client
//! request directly. The control loop picks up client writes on its next
//! sync cycle.

use std::future;
use std::net::SocketAddr;
use std::sync::Arc;

use errors::{IoSyncError, Result};
use iosync_core::MemoryRegisterMap;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tracing::{debug, error, info, warn};

pub type SharedRegisterMap = Arc<Mutex<MemoryRegisterMap>>;

// ============================================================================
// Request handling
// ============================================================================

/// Per-connection service; all connections share one map
#[derive(Clone)]
pub struct RegisterService {
    map: SharedRegisterMap,
}

impl RegisterService {
    pub fn new(map: SharedRegisterMap) -> Self {
        Self { map }
    }

    fn handle(&self, req: Request<'static>) -> std::result::Result<Response, ExceptionCode> {
        let illegal_address = |e: IoSyncError| {
            debug!("Rejected request: {}", e);
            ExceptionCode::IllegalDataAddress
        };

        match req {
            Request::ReadCoils(addr, cnt) => self
                .map
                .lock()
                .coils(addr, cnt)
                .map(Response::ReadCoils)
                .map_err(illegal_address),
            Request::ReadDiscreteInputs(addr, cnt) => self
                .map
                .lock()
                .discrete_inputs(addr, cnt)
                .map(Response::ReadDiscreteInputs)
                .map_err(illegal_address),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .map
                .lock()
                .holding_registers(addr, cnt)
                .map(Response::ReadHoldingRegisters)
                .map_err(illegal_address),
            Request::ReadInputRegisters(addr, cnt) => self
                .map
                .lock()
                .input_registers(addr, cnt)
                .map(Response::ReadInputRegisters)
                .map_err(illegal_address),
            Request::WriteSingleCoil(addr, value) => self
                .map
                .lock()
                .set_coils(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleCoil(addr, value))
                .map_err(illegal_address),
            Request::WriteMultipleCoils(addr, values) => self
                .map
                .lock()
                .set_coils(addr, &values)
                .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16))
                .map_err(illegal_address),
            Request::WriteSingleRegister(addr, value) => self
                .map
                .lock()
                .set_holding_registers(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleRegister(addr, value))
                .map_err(illegal_address),
            Request::WriteMultipleRegisters(addr, values) => self
                .map
                .lock()
                .set_holding_registers(addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
                .map_err(illegal_address),
            _ => {
                warn!("Unsupported Modbus function: {:?}", req);
                Err(ExceptionCode::IllegalFunction)
            },
        }
    }
}

impl tokio_modbus::server::Service for RegisterService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<std::result::Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Modbus request: {:?}", req);
        future::ready(self.handle(req))
    }
}

// ============================================================================
// Server lifecycle
// ============================================================================

/// Running Modbus TCP server
pub struct ModbusTransport {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ModbusTransport {
    /// Bind and start serving; a bind failure is a protocol init failure
    pub async fn start(bind: &str, map: SharedRegisterMap) -> Result<Self> {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| IoSyncError::transport(format!("bind {} failed: {}", bind, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| IoSyncError::transport(format!("local address: {}", e)))?;
        info!("Modbus TCP listening on {}", local_addr);

        let server = Server::new(listener);
        let task = tokio::spawn(async move {
            let on_connected = move |stream, socket_addr: SocketAddr| {
                let service = RegisterService::new(Arc::clone(&map));
                async move {
                    debug!("Modbus client connected: {}", socket_addr);
                    accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(service.clone())))
                }
            };
            let on_process_error = |err| {
                error!("Modbus connection error: {err}");
            };
            if let Err(e) = server.serve(&on_connected, on_process_error).await {
                error!("Modbus server stopped: {}", e);
            }
        });

        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ModbusTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}
