//! XOR problem training example.
//!
//! Demonstrates training a simple MLP to learn the XOR function.
//! XOR is a classic non-linearly separable problem that requires hidden layers.
//!
//! Run with `RUST_LOG=debug` to see shape inference and compilation.

use nnlib::prelude::*;

fn main() -> NnResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // XOR dataset, one batch of four column vectors
    let inputs = [
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let targets = [vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
    let x = Tensor::from_batches(1, 2, 1, &inputs)?;
    let y = Tensor::from_batches(1, 1, 1, &targets)?;

    // Create a simple 2-layer MLP: 2 -> 16 -> 1
    let mut net = Network::with_config(NetworkConfig::seeded(7));
    net.add(Dense::with_input(2, 16)?.with_activation(ActivationKind::Relu))?
        .add(Dense::new(1)?)?;
    net.compile(MseLoss::new(), Sgd::with_momentum(0.02, 0.9))?;

    println!("Training XOR network...\n");

    for epoch in 0..2000 {
        let loss = net.forward(&x, &y)?;
        net.backward()?;
        net.update_weights()?;

        if epoch % 200 == 0 || epoch == 1999 {
            println!("Epoch {:4}: loss = {:.6}", epoch, loss);
        }
    }

    // Test the trained network
    println!("\nTesting trained network:");
    println!("========================");

    let prediction = net.predict(&x)?;
    let mut correct = 0;
    for (b, (input, target)) in inputs.iter().zip(targets.iter()).enumerate() {
        let output = prediction.get(b, 0, 0, 0)?;
        let predicted_class = if output > 0.5 { 1.0 } else { 0.0 };
        println!("  {:?} -> {:.4}", input, output);
        if (predicted_class - target[0]).abs() < 0.01 {
            correct += 1;
        }
    }

    println!("\nAccuracy: {}/4", correct);
    if correct == 4 {
        println!("Successfully learned XOR!");
    }
    Ok(())
}
