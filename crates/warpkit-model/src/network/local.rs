//! Encoder/decoder backbone predicting a dense field at full resolution.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig},
        Gelu, Initializer, LayerNorm, LayerNormConfig, PaddingConfig3d,
    },
    prelude::*,
};

#[derive(Config, Debug)]
pub struct LocalNetConfig {
    #[config(default = 2)]
    pub in_channels: usize,
    #[config(default = 8)]
    pub num_channel_initial: usize,
    /// Number of stride-2 downsamplings.
    #[config(default = 3)]
    pub extract_levels: usize,
    #[config(default = 3)]
    pub out_channels: usize,
}

impl LocalNetConfig {
    /// Channel width at each level, from full resolution down to the bottleneck.
    pub fn level_channels(&self) -> Vec<usize> {
        (0..=self.extract_levels)
            .map(|level| self.num_channel_initial << level)
            .collect()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LocalNet<B> {
        let channels = self.level_channels();
        let levels = self.extract_levels;

        let mut encoders = Vec::with_capacity(levels);
        let mut downs = Vec::with_capacity(levels);
        for level in 0..levels {
            let in_ch = if level == 0 { self.in_channels } else { channels[level] };
            encoders.push(ConvBlockConfig::new(in_ch, channels[level]).init(device));
            downs.push(
                Conv3dConfig::new([channels[level], channels[level + 1]], [3, 3, 3])
                    .with_stride([2, 2, 2])
                    .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                    .init(device),
            );
        }

        let bottleneck_in = if levels == 0 { self.in_channels } else { channels[levels] };
        let bottleneck = ConvBlockConfig::new(bottleneck_in, channels[levels]).init(device);

        // Decoder runs from the deepest level back up.
        let mut ups = Vec::with_capacity(levels);
        let mut decoders = Vec::with_capacity(levels);
        for level in (0..levels).rev() {
            ups.push(
                ConvTranspose3dConfig::new([channels[level + 1], channels[level]], [2, 2, 2])
                    .with_stride([2, 2, 2])
                    .init(device),
            );
            decoders.push(ConvBlockConfig::new(2 * channels[level], channels[level]).init(device));
        }

        // Near-zero head so training starts close to the identity transform.
        let head = Conv3dConfig::new([channels[0], self.out_channels], [3, 3, 3])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 1e-5,
            })
            .init(device);

        LocalNet {
            encoders,
            downs,
            bottleneck,
            ups,
            decoders,
            head,
        }
    }
}

#[derive(Module, Debug)]
pub struct LocalNet<B: Backend> {
    encoders: Vec<ConvBlock<B>>,
    downs: Vec<Conv3d<B>>,
    bottleneck: ConvBlock<B>,
    ups: Vec<ConvTranspose3d<B>>,
    decoders: Vec<ConvBlock<B>>,
    head: Conv3d<B>,
}

impl<B: Backend> LocalNet<B> {
    /// `[B, in_channels, D, H, W]` -> `[B, out_channels, D, H, W]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = x;
        for (encoder, down) in self.encoders.iter().zip(&self.downs) {
            let skip = encoder.forward(x);
            x = down.forward(skip.clone());
            skips.push(skip);
        }

        let mut x = self.bottleneck.forward(x);

        for ((up, decoder), skip) in self.ups.iter().zip(&self.decoders).zip(skips.into_iter().rev()) {
            let upsampled = crop_to(up.forward(x), &skip);
            x = decoder.forward(Tensor::cat(vec![upsampled, skip], 1));
        }

        self.head.forward(x)
    }
}

/// Crop the spatial extent of `x` to that of `reference`.
///
/// A stride-2 convolution rounds odd extents up, so upsampling can overshoot by one voxel.
fn crop_to<B: Backend>(x: Tensor<B, 5>, reference: &Tensor<B, 5>) -> Tensor<B, 5> {
    let [b, c, d, h, w] = x.dims();
    let [_, _, rd, rh, rw] = reference.dims();
    if (d, h, w) == (rd, rh, rw) {
        return x;
    }
    x.slice([0..b, 0..c, 0..rd.min(d), 0..rh.min(h), 0..rw.min(w)])
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv3d<B>,
    norm1: LayerNorm<B>,
    act: Gelu,
    conv2: Conv3d<B>,
    norm2: LayerNorm<B>,
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv1: Conv3dConfig::new([self.in_channels, self.out_channels], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            norm1: LayerNormConfig::new(self.out_channels).init(device),
            act: Gelu::new(),
            conv2: Conv3dConfig::new([self.out_channels, self.out_channels], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            norm2: LayerNormConfig::new(self.out_channels).init(device),
        }
    }
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv1.forward(x);
        // LayerNorm normalises the last axis; move channels there and back.
        let x = self.norm1.forward(x.permute([0, 2, 3, 4, 1])).permute([0, 4, 1, 2, 3]);
        let x = self.act.forward(x);

        let x = self.conv2.forward(x);
        let x = self.norm2.forward(x.permute([0, 2, 3, 4, 1])).permute([0, 4, 1, 2, 3]);
        self.act.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_level_channels_double() {
        let config = LocalNetConfig::new().with_num_channel_initial(4);
        assert_eq!(config.level_channels(), vec![4, 8, 16, 32]);
    }

    #[test]
    fn test_forward_keeps_spatial_shape() {
        let device = Default::default();
        let net = LocalNetConfig::new()
            .with_num_channel_initial(2)
            .with_extract_levels(2)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::ones([1, 2, 8, 8, 8], &device);
        assert_eq!(net.forward(x).dims(), [1, 3, 8, 8, 8]);
    }

    #[test]
    fn test_forward_odd_extents() {
        let device = Default::default();
        let net = LocalNetConfig::new()
            .with_num_channel_initial(2)
            .with_extract_levels(2)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::ones([2, 2, 5, 7, 3], &device);
        assert_eq!(net.forward(x).dims(), [2, 3, 5, 7, 3]);
    }

    #[test]
    fn test_initial_output_is_small() {
        let device = Default::default();
        let net = LocalNetConfig::new()
            .with_num_channel_initial(2)
            .with_extract_levels(1)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 5>::random(
            [1, 2, 4, 4, 4],
            burn::tensor::Distribution::Default,
            &device,
        );
        let max = net.forward(x).abs().max().into_scalar();
        assert!(max < 1e-2);
    }
}
