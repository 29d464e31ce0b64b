//! 端到端集成测试: 转封装任务的完整流程.
//!
//! 测试流程: 生成 WAV / FLV 文件 → RemuxJob 转封装 → 重新解封装输出 → 验证
//! 以及: 创建失败、取消、进度回调、null 输出等场景.

use std::path::Path;

use ferry::core::{MediaType, NOPTS_VALUE, Rational};
use ferry::format::{CodecId, FormatId, InputContext, OutputContext, Packet, Stream};
use ferry::remux::{LoopEnd, Progress, RemuxError, RemuxJob, RemuxOptions};

use support::*;

mod support {
    use std::path::Path;

    use ferry::core::Rational;
    use ferry::format::stream::{AudioStreamParams, StreamParams, VideoStreamParams};
    use ferry::format::{CodecId, FormatId, InputContext, OutputContext, Packet, Stream};

    /// 生成正弦波 PCM S16LE 数据
    pub fn generate_sine_s16(sample_rate: u32, duration_sec: f64, channels: u32) -> Vec<u8> {
        let total_samples = (sample_rate as f64 * duration_sec) as usize;
        let mut buf = Vec::with_capacity(total_samples * channels as usize * 2);
        for i in 0..total_samples {
            let t = i as f64 / sample_rate as f64;
            let value = (t * 440.0 * 2.0 * std::f64::consts::PI).sin();
            let sample = (value * 32767.0) as i16;
            for _ch in 0..channels {
                buf.extend_from_slice(&sample.to_le_bytes());
            }
        }
        buf
    }

    /// 手工拼装一个 PCM S16LE 的 WAV 文件
    pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, pcm: &[u8]) {
        let block_align = channels * 2;
        let mut buf = Vec::with_capacity(44 + pcm.len());
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        buf.extend_from_slice(pcm);
        std::fs::write(path, buf).unwrap();
    }

    pub fn h264_stream() -> Stream {
        let mut stream = Stream::new(
            0,
            CodecId::H264,
            Rational::MILLI,
            StreamParams::Video(VideoStreamParams {
                width: 320,
                height: 240,
                frame_rate: Rational::new(25, 1),
                bit_rate: 0,
            }),
        );
        stream.extra_data = vec![0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x00];
        stream
    }

    pub fn aac_stream() -> Stream {
        let mut stream = Stream::new(
            1,
            CodecId::Aac,
            Rational::MILLI,
            StreamParams::Audio(AudioStreamParams {
                sample_rate: 44100,
                channels: 2,
                bits_per_sample: 0,
                bit_rate: 0,
                frame_size: 1024,
            }),
        );
        // AAC LC, 44.1kHz, 双声道
        stream.extra_data = vec![0x12, 0x10];
        stream
    }

    /// 用 FLV 封装器生成一个 H.264 + AAC 的 FLV 文件
    ///
    /// 视频 25fps 带 2 帧 B 帧延迟, 音频每帧约 23ms.
    /// 返回写入的 (视频, 音频) 数据包数.
    pub fn write_av_flv(path: &Path, video_frames: usize) -> (usize, usize) {
        let registry = ferry::default_format_registry();
        let mut output = OutputContext::create_with_format(path, FormatId::Flv, &registry).unwrap();
        output.add_stream(&h264_stream()).unwrap();
        output.add_stream(&aac_stream()).unwrap();
        output.open_file().unwrap();
        output.write_header().unwrap();

        let audio_frames = video_frames * 40 / 23;
        let mut packets = Vec::new();
        for i in 0..video_frames {
            let dts = i as i64 * 40;
            let mut pkt = Packet::from_data(vec![(i % 251) as u8; 100 + i % 7]);
            pkt.stream_index = 0;
            pkt.dts = dts;
            pkt.pts = dts + 80;
            pkt.duration = 40;
            pkt.is_keyframe = i % 25 == 0;
            packets.push(pkt);
        }
        for i in 0..audio_frames {
            let ts = i as i64 * 23;
            let mut pkt = Packet::from_data(vec![0xA0 | (i % 16) as u8; 60 + i % 5]);
            pkt.stream_index = 1;
            pkt.dts = ts;
            pkt.pts = ts;
            pkt.duration = 23;
            pkt.is_keyframe = true;
            packets.push(pkt);
        }
        packets.sort_by_key(|p| (p.dts, p.stream_index));
        for pkt in packets {
            output.write_interleaved(pkt).unwrap();
        }
        output.write_trailer().unwrap();
        output.close().unwrap();
        (video_frames, audio_frames)
    }

    /// 打开文件并读出全部数据包
    pub fn read_all(path: &Path) -> (Vec<Stream>, Vec<Packet>) {
        let registry = ferry::default_format_registry();
        let mut input = InputContext::open(path, &registry).unwrap();
        let streams = input.streams().to_vec();
        let mut packets = Vec::new();
        loop {
            match input.read_packet() {
                Ok(pkt) => packets.push(pkt),
                Err(e) if e.is_eof() => break,
                Err(e) => panic!("读取数据包失败: {e}"),
            }
        }
        (streams, packets)
    }

    /// 拼接全部数据包负载
    pub fn concat_payload(packets: &[Packet]) -> Vec<u8> {
        packets.iter().flat_map(|p| p.data.iter().copied()).collect()
    }
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

#[test]
fn test_wav_转_flv_再转回_wav_数据不变() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let mid = dir.path().join("mid.flv");
    let dst = dir.path().join("dst.wav");

    let pcm = generate_sine_s16(44100, 1.0, 2);
    write_wav(&src, 44100, 2, &pcm);

    let mut job = RemuxJob::create(&src, &mid).unwrap();
    assert_eq!(job.output_format(), Some(FormatId::Flv));
    assert_eq!(job.output_streams().len(), 1);
    let summary = job.process().unwrap();
    drop(job);
    assert_eq!(summary.end, LoopEnd::EndOfStream);
    assert!(summary.packets_read > 0);
    assert_eq!(summary.packets_written, summary.packets_read);
    assert_eq!(summary.packets_dropped, 0);

    let (streams, packets) = read_all(&mid);
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].codec_id, CodecId::PcmS16le);
    assert_eq!(streams[0].time_base, Rational::MILLI);
    assert_eq!(concat_payload(&packets), pcm, "FLV 中的 PCM 数据应与源一致");

    let summary = RemuxJob::create(&mid, &dst).unwrap().process().unwrap();
    assert_eq!(summary.end, LoopEnd::EndOfStream);

    let (streams, packets) = read_all(&dst);
    assert_eq!(streams.len(), 1);
    let audio = streams[0].audio().unwrap();
    assert_eq!((audio.sample_rate, audio.channels), (44100, 2));
    assert_eq!(concat_payload(&packets), pcm, "往返后 PCM 数据应与源一致");
    assert!(file_len(&dst) >= file_len(&src));
}

#[test]
fn test_多流_flv_转封装保持负载与时间戳() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("av.flv");
    let dst = dir.path().join("copy.flv");
    let (video_count, audio_count) = write_av_flv(&src, 50);

    let (src_streams, src_packets) = read_all(&src);
    assert_eq!(src_streams.len(), 2);
    assert_eq!(src_packets.len(), video_count + audio_count);

    let mut job = RemuxJob::create(&src, &dst).unwrap();
    let in_types: Vec<MediaType> = job.input_streams().iter().map(|s| s.media_type).collect();
    let out_types: Vec<MediaType> = job.output_streams().iter().map(|s| s.media_type).collect();
    assert_eq!(in_types, out_types, "输出流应与输入流一一对应");
    let summary = job.process().unwrap();
    drop(job);
    assert_eq!(summary.packets_written as usize, video_count + audio_count);

    let (dst_streams, dst_packets) = read_all(&dst);
    assert_eq!(dst_streams.len(), 2);
    for (a, b) in src_streams.iter().zip(&dst_streams) {
        assert_eq!(a.codec_id, b.codec_id);
        assert_eq!(a.extra_data, b.extra_data, "sequence header 应原样保留");
    }

    // 每条流内部的负载顺序与时间戳不变
    for stream in &src_streams {
        let pick = |packets: &[Packet]| -> Vec<(i64, i64, Vec<u8>)> {
            packets
                .iter()
                .filter(|p| p.stream_index == stream.index)
                .map(|p| (p.dts, p.pts, p.data.to_vec()))
                .collect()
        };
        assert_eq!(pick(&src_packets), pick(&dst_packets), "流 {} 数据不一致", stream.index);
    }
}

#[test]
fn test_输出_dts_单调递增() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("av.flv");
    let dst = dir.path().join("copy.flv");
    write_av_flv(&src, 30);

    RemuxJob::create(&src, &dst).unwrap().process().unwrap();

    let (streams, packets) = read_all(&dst);
    let mut last = vec![NOPTS_VALUE; streams.len()];
    for pkt in &packets {
        let prev = last[pkt.stream_index];
        assert!(prev == NOPTS_VALUE || pkt.dts >= prev, "流 {} dts 倒退", pkt.stream_index);
        assert!(pkt.pts >= pkt.dts);
        last[pkt.stream_index] = pkt.dts;
    }
}

#[test]
fn test_输入输出相同路径_创建失败() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("same.wav");
    let pcm = generate_sine_s16(8000, 0.1, 1);
    write_wav(&path, 8000, 1, &pcm);
    let before = std::fs::read(&path).unwrap();

    let err = RemuxJob::create(&path, &path).err().unwrap();
    assert!(matches!(err, RemuxError::SamePath(_)), "错误类型: {err}");

    // 经由不同写法指向同一文件
    let alias = dir.path().join(".").join("same.wav");
    let err = RemuxJob::create(&path, &alias).err().unwrap();
    assert!(matches!(err, RemuxError::SamePath(_)), "错误类型: {err}");

    assert_eq!(std::fs::read(&path).unwrap(), before, "输入文件不应被改动");
}

#[test]
fn test_输入不存在_创建失败且不创建输出() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.flv");
    let err = RemuxJob::create(dir.path().join("missing.wav"), &output)
        .err()
        .unwrap();
    assert!(matches!(err, RemuxError::InputNotFound(_)));
    assert!(err.is_creation_error());
    assert!(!output.exists());
}

#[test]
fn test_无法识别的输入_创建失败() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("noise.bin");
    std::fs::write(&input, vec![0x5Au8; 512]).unwrap();
    let err = RemuxJob::create(&input, dir.path().join("out.flv"))
        .err()
        .unwrap();
    assert!(matches!(err, RemuxError::OpenInput { .. }), "错误类型: {err}");
}

#[test]
fn test_未知输出扩展名_创建失败() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    write_wav(&input, 8000, 1, &generate_sine_s16(8000, 0.1, 1));
    let err = RemuxJob::create(&input, dir.path().join("out.xyz"))
        .err()
        .unwrap();
    assert!(matches!(err, RemuxError::UnknownOutputFormat { .. }), "错误类型: {err}");
}

#[test]
fn test_音视频输入写_wav_创建失败() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("av.flv");
    let dst = dir.path().join("out.wav");
    write_av_flv(&src, 10);

    let err = RemuxJob::create(&src, &dst).err().unwrap();
    assert!(matches!(err, RemuxError::AddStream { .. }), "错误类型: {err}");
    assert!(err.is_creation_error());
    assert!(!dst.exists(), "流映射失败时不应创建输出文件");
}

#[test]
fn test_进度单调且覆盖_0_到_100() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let dst = dir.path().join("dst.flv");
    // 4096 采样一个数据包, 约 54 个数据包
    write_wav(&src, 44100, 1, &generate_sine_s16(44100, 5.0, 1));

    let mut values = Vec::new();
    let summary = RemuxJob::create(&src, &dst)
        .unwrap()
        .process_with(|percent| {
            values.push(percent);
            Progress::Continue
        })
        .unwrap();

    assert_eq!(summary.end, LoopEnd::EndOfStream);
    assert_eq!(values.first(), Some(&0.0));
    assert_eq!(values.last(), Some(&100.0));
    assert!(values.len() >= 3, "中间应至少报告一次进度: {values:?}");
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "进度应单调不减: {values:?}");
    assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));

    // 默认每 11 个数据包报告一次, 加上开头与结尾
    let expected = summary.packets_read / 11 + 2;
    assert_eq!(values.len() as u64, expected);
}

#[test]
fn test_取消后仍写出完整文件() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let dst = dir.path().join("dst.wav");
    let pcm = generate_sine_s16(44100, 3.0, 1);
    write_wav(&src, 44100, 1, &pcm);

    let options = RemuxOptions {
        progress_interval: 1,
        ..RemuxOptions::default()
    };
    let registry = ferry::default_format_registry();
    let mut calls = Vec::new();
    let summary = RemuxJob::create_with(&src, &dst, &registry, options)
        .unwrap()
        .process_with(|percent| {
            calls.push(percent);
            // 0% 之后第 3 次回调要求停止
            if calls.len() == 4 { Progress::Cancel } else { Progress::Continue }
        })
        .unwrap();

    assert_eq!(summary.end, LoopEnd::Cancelled);
    assert_eq!(summary.packets_read, 3);
    assert_eq!(calls.last(), Some(&100.0), "取消后仍应报告 100%");
    assert_eq!(calls.len(), 5);

    let (streams, packets) = read_all(&dst);
    assert_eq!(streams.len(), 1);
    let written = concat_payload(&packets);
    assert!(!written.is_empty());
    assert!(written.len() < pcm.len());
    assert_eq!(&pcm[..written.len()], &written[..], "已写出部分应为源数据的前缀");
}

#[test]
fn test_开头即取消_只写头尾() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let dst = dir.path().join("dst.wav");
    write_wav(&src, 8000, 1, &generate_sine_s16(8000, 1.0, 1));

    let mut calls = Vec::new();
    let summary = RemuxJob::create(&src, &dst)
        .unwrap()
        .process_with(|percent| {
            calls.push(percent);
            Progress::Cancel
        })
        .unwrap();
    assert_eq!(summary.end, LoopEnd::Cancelled);
    assert_eq!(summary.packets_read, 0);
    assert_eq!(calls, vec![0.0, 100.0]);

    let (_, packets) = read_all(&dst);
    assert!(packets.is_empty());
}

#[test]
fn test_null_输出不创建文件() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("av.flv");
    let dst = dir.path().join("discard");
    let (video_count, audio_count) = write_av_flv(&src, 20);

    let options = RemuxOptions {
        output_format: Some("null".into()),
        ..RemuxOptions::default()
    };
    let registry = ferry::default_format_registry();
    let mut job = RemuxJob::create_with(&src, &dst, &registry, options).unwrap();
    assert_eq!(job.output_format(), Some(FormatId::Null));
    let summary = job.process().unwrap();
    drop(job);

    assert_eq!(summary.packets_written as usize, video_count + audio_count);
    assert!(!dst.exists(), "null 格式不应创建输出文件");
}

#[test]
fn test_重复执行返回错误() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    write_wav(&src, 11025, 1, &generate_sine_s16(11025, 0.2, 1));

    let mut job = RemuxJob::create(&src, dir.path().join("dst.flv")).unwrap();
    job.process().unwrap();
    assert!(matches!(job.process(), Err(RemuxError::AlreadyProcessed)));
}

#[test]
fn test_flv_不支持的_pcm_采样率_写头部失败() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let dst = dir.path().join("dst.flv");
    write_wav(&src, 8000, 1, &generate_sine_s16(8000, 0.2, 1));

    // 流映射阶段不检查采样率, 任务可以创建
    let mut job = RemuxJob::create(&src, &dst).unwrap();
    let mut called = false;
    let err = job
        .process_with(|_| {
            called = true;
            Progress::Continue
        })
        .unwrap_err();
    assert!(matches!(err, RemuxError::WriteHeader(_)), "错误类型: {err}");
    assert!(!err.is_creation_error());
    assert!(!called);
}

/// 手工拼装 fmt 块参数任意的 WAV 文件
fn write_raw_wav(path: &Path, channels: u16, sample_rate: u32, block_align: u16, bits: u16) {
    let pcm = [0u8; 64];
    let mut buf = Vec::new();
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    buf.extend_from_slice(b"WAVEfmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&sample_rate.wrapping_mul(u32::from(block_align)).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pcm);
    std::fs::write(path, buf).unwrap();
}

#[test]
fn test_fmt_参数矛盾的_wav_打开失败() {
    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("out.wav");

    // 40000 声道 16 位, 块大小却只有 2 字节
    let src = dir.path().join("channels.wav");
    write_raw_wav(&src, 40000, 8000, 2, 16);
    let err = RemuxJob::create(&src, &dst).err().unwrap();
    assert!(matches!(err, RemuxError::OpenInput { .. }), "错误类型: {err}");

    // 采样率超出时间基可表示的范围
    let src = dir.path().join("rate.wav");
    write_raw_wav(&src, 1, 0x8000_0000, 2, 16);
    let err = RemuxJob::create(&src, &dst).err().unwrap();
    assert!(matches!(err, RemuxError::OpenInput { .. }), "错误类型: {err}");
    assert!(!dst.exists());
}

#[test]
fn test_data_块之后的残缺数据不影响打开() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let dst = dir.path().join("dst.wav");
    let pcm = generate_sine_s16(8000, 0.5, 1);
    write_wav(&src, 8000, 1, &pcm);

    // 末尾追加半个块头
    let mut bytes = std::fs::read(&src).unwrap();
    bytes.extend_from_slice(b"junk\x01");
    std::fs::write(&src, bytes).unwrap();

    let summary = RemuxJob::create(&src, &dst).unwrap().process().unwrap();
    assert_eq!(summary.end, LoopEnd::EndOfStream);
    let (_, packets) = read_all(&dst);
    assert_eq!(concat_payload(&packets), pcm);
}

#[test]
fn test_输出上下文拒绝时间戳倒退() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.flv");
    let registry = ferry::default_format_registry();
    let mut output = OutputContext::create(&path, &registry).unwrap();
    output.add_stream(&aac_stream()).unwrap();
    output.open_file().unwrap();
    output.write_header().unwrap();

    let packet = |dts: i64| {
        let mut pkt = Packet::from_data(vec![1u8, 2, 3]);
        pkt.dts = dts;
        pkt.pts = dts;
        pkt
    };
    output.write_interleaved(packet(100)).unwrap();
    output.write_interleaved(packet(100)).unwrap();
    let err = output.write_interleaved(packet(50)).unwrap_err();
    assert!(err.is_recoverable());
    output.write_trailer().unwrap();
    output.close().unwrap();

    let (_, packets) = read_all(&path);
    assert_eq!(packets.len(), 2);
}

#[test]
fn test_输入上下文按索引取流() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("av.flv");
    write_av_flv(&src, 5);
    let registry = ferry::default_format_registry();
    let input = InputContext::open(&src, &registry).unwrap();
    assert_eq!(input.format_id(), FormatId::Flv);
    let video: &Stream = input.stream(0).unwrap();
    assert_eq!(video.codec_id, CodecId::H264);
    assert!(input.stream(2).is_err());
}
