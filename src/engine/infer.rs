//! Single-input OpenVINO inference helpers

use anyhow::{Context, Result};
use ndarray::Array4;
use openvino::{ElementType, InferRequest, Shape, Tensor};

use super::pool::LoadedModel;

/// Run `model` on one NCHW f32 input and hand back the finished request
pub fn run_inference(model: &LoadedModel, input: &Array4<f32>) -> Result<InferRequest> {
    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let raw = tensor.get_raw_data_mut()?;
    let mut written = 0;
    for (dst, value) in raw.chunks_exact_mut(4).zip(input.iter()) {
        dst.copy_from_slice(&value.to_ne_bytes());
        written += 1;
    }
    anyhow::ensure!(
        written == input.len(),
        "input tensor holds {} values, expected {}",
        written,
        input.len()
    );

    let mut request = model.create_infer_request()?;
    request.set_input_tensor(&tensor)?;
    request.infer().context("inference failed")?;
    Ok(request)
}

/// Copy an f32 output tensor into a vector
pub fn read_output(tensor: &Tensor) -> Result<Vec<f32>> {
    let raw = tensor.get_raw_data()?;
    Ok(bytes_to_f32(raw))
}

fn bytes_to_f32(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_f32() {
        let values = [1.5f32, -2.0, 0.0];
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(bytes_to_f32(&raw), values.to_vec());
    }

    #[test]
    fn test_bytes_to_f32_ignores_trailing() {
        let mut raw = 3.0f32.to_ne_bytes().to_vec();
        raw.push(0xff);
        assert_eq!(bytes_to_f32(&raw), vec![3.0]);
    }
}
