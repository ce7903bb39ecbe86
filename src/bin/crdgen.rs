//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions served by the operator as a multi-document
//! YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/all.yaml
//! cargo run --bin crdgen -- --kind KeycloakClient | kubectl apply -f -
//! ```

use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use keycloak_realm_operator::crd::{
    KeycloakClient, KeycloakClientCredential, KeycloakClientScope, KeycloakGroup, KeycloakUser,
    ManagedKeycloakRealm,
};
use kube::core::CustomResourceExt;

#[derive(Parser, Debug)]
#[command(name = "crdgen", about = "Print the operator's CustomResourceDefinitions")]
struct Args {
    /// Only print the CRD of this kind
    #[arg(long)]
    kind: Option<String>,
}

fn main() {
    let args = Args::parse();
    let crds: Vec<CustomResourceDefinition> = vec![
        ManagedKeycloakRealm::crd(),
        KeycloakClient::crd(),
        KeycloakClientScope::crd(),
        KeycloakGroup::crd(),
        KeycloakUser::crd(),
        KeycloakClientCredential::crd(),
    ];
    let selected: Vec<_> = crds
        .into_iter()
        .filter(|crd| {
            args.kind
                .as_deref()
                .is_none_or(|kind| crd.spec.names.kind == kind)
        })
        .collect();
    if selected.is_empty() {
        eprintln!("No CRD of kind {}", args.kind.unwrap_or_default());
        std::process::exit(1);
    }

    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    for crd in selected {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
