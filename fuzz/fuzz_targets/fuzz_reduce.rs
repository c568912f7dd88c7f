//! Structure-aware fuzzing of the reduction strategies.
//!
//! None of the four strategies may panic, whatever the input, and on finite
//! input they all succeed together with the ground truth.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sumlab_types::{Algorithm, Operation};

#[derive(Arbitrary, Debug)]
struct Input {
    values: Vec<f64>,
    operation: Operation,
}

fuzz_target!(|input: Input| {
    let finite = input.values.iter().all(|v| v.is_finite());
    let truth = sumlab_domain::ground_truth_value(&input.values, input.operation);

    for algorithm in Algorithm::ALL {
        let result = sumlab_domain::reduce(algorithm, &input.values, input.operation);
        if finite {
            assert_eq!(result.is_ok(), truth.is_ok());
        }
    }
});
