//! TLS material for the relay.
//!
//! See [`cert_provisioner`] for how the certificate is found or created.

pub mod cert_provisioner;

pub use cert_provisioner::{
    load_server_config, CertError, CertOrigin, CertProvisioner, CertificateInfo,
};
