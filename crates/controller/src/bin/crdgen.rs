//! # CRD Generator
//!
//! Prints every CustomResourceDefinition the controller uses as a
//! multi-document YAML stream.
//!
//! ```bash
//! crdgen | kubectl apply -f -
//! ```

use resource_controller::controller::kinds;

fn main() {
    for crd in kinds::crds() {
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
