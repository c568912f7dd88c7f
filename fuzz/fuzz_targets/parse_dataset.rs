#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<sumlab_types::DatasetFile>(data);
    let _ = serde_json::from_slice::<sumlab_types::DistributionReceipt>(data);
});
